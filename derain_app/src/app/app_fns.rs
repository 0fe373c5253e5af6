use std::error::Error;

use derain_video::*;
use eyre::WrapErr;

use crate::app::*;

pub fn run_app() -> i32 {
    let cfg = arg_parse::parse_args();
    configure_logs(cfg.verbosity);

    let ret = match run_app_inner(&cfg) {
        Ok(()) => 0,
        Err(fatal_error) => {
            print_fatal_err(fatal_error, cfg.verbosity);
            1
        }
    };

    ret
}

fn run_app_inner(cfg: &AppCfg) -> eyre::Result<()> {
    if cfg.input == cfg.output {
        return Err(AppError::OutputIsInput(cfg.input.clone()).into());
    }

    let mut restorer = load_restorer(&cfg.model)?;

    let mut pipeline = Pipeline::new(cfg.pipeline.clone());
    let report = pipeline
        .run(&cfg.input, &cfg.output, restorer.as_mut())
        .wrap_err_with(|| format!("failed to restore {}", cfg.input.display()))?;

    if report.truncated_tail_bytes != 0 {
        warn!(
            "the last {} bytes of decoded video did not form a complete frame and were dropped",
            report.truncated_tail_bytes
        );
    }

    info!(
        "restored {} frames ({}x{} @ {} fps) into {}",
        report.frames_written,
        report.descriptor.width,
        report.descriptor.height,
        report.descriptor.frame_rate,
        cfg.output.display()
    );

    #[allow(clippy::print_stdout)]
    let () = println!("Elapsed time: {:.2} seconds", report.elapsed.as_secs_f64());

    Ok(())
}

fn load_restorer(model: &ModelCfg) -> eyre::Result<Box<dyn Restorer>> {
    match model {
        ModelCfg::Passthrough => {
            info!("passthrough: frames are re-encoded without restoration");
            Ok(Box::new(IdentityRestorer))
        }
        ModelCfg::Weights { path, restorer } => {
            if !path.is_file() {
                return Err(AppError::WeightsNotFound(path.clone()).into());
            }
            load_weights(path, restorer)
        }
    }
}

#[cfg(feature = "onnx")]
fn load_weights(path: &std::path::Path, cfg: &RestorerCfg) -> eyre::Result<Box<dyn Restorer>> {
    let restorer = OnnxRestorer::load(path, cfg)
        .wrap_err_with(|| format!("failed to load model from {}", path.display()))?;
    Ok(Box::new(restorer))
}

#[cfg(not(feature = "onnx"))]
fn load_weights(path: &std::path::Path, _cfg: &RestorerCfg) -> eyre::Result<Box<dyn Restorer>> {
    Err(AppError::ModelSupportMissing(path.to_path_buf()).into())
}

fn print_fatal_err(fatal_err: eyre::Report, verbosity: ReportVerbosity) {
    error!(target: "app-errorlog", "{}", fatal_err);

    if verbosity == ReportVerbosity::Verbose {
        let mut source: Option<&(dyn Error + 'static)> = fatal_err.source();
        while let Some(e) = source {
            error!(target: "app-errorlog", "    caused by: {}", e);
            source = e.source();
        }
    }

    // shown at every verbosity
    if let Some(diagnostics) = fatal_err.downcast_ref::<PipelineError>().and_then(PipelineError::diagnostics) {
        error!(target: "app-errorlog", "ffmpeg reported:");
        for line in diagnostics.lines() {
            error!(target: "app-errorlog", "    {}", line);
        }
    }
}

pub fn configure_logs(verbosity: ReportVerbosity) {
    use simplelog::*;

    let mut cfg = simplelog::ConfigBuilder::new();
    cfg.set_target_level(LevelFilter::Error);
    cfg.set_thread_level(LevelFilter::Off);

    let min_loglevel = match verbosity {
        ReportVerbosity::Quiet => LevelFilter::Warn,
        ReportVerbosity::Default => LevelFilter::Info,
        ReportVerbosity::Verbose => LevelFilter::Trace,
    };

    if let Err(e) = TermLogger::init(
        min_loglevel,
        cfg.build(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        #[allow(clippy::print_stderr)]
        let () = eprintln!("failed to initialize logging: {e}");
    }
}
