use std::path::{Path, PathBuf};

use clap::{value_parser, ArgAction::*};
use derain_video::*;

use crate::app::*;

// files
const INPUT: &str = "Input video";
const OUTPUT: &str = "Output video";

// model
const WEIGHTS: &str = "Model weights";
const PASSTHROUGH: &str = "Passthrough";
const GPU: &str = "Gpu";
const OUTPUT_INDEX: &str = "Model output index";

// encoding
const CODEC: &str = "Codec";
const PIX_FMT: &str = "Pixel format";
const CRF: &str = "Crf";

//Verbosity
const VERBOSITY_QUIET: &str = "Quiet";
const VERBOSITY_VERBOSE: &str = "Verbose";

const DISPLAY_ORDERING: [&str; 11] = [
    //
    // files
    INPUT,
    OUTPUT,
    //
    // model
    WEIGHTS,
    PASSTHROUGH,
    GPU,
    OUTPUT_INDEX,
    //
    // encoding
    CODEC,
    PIX_FMT,
    CRF,
    //
    //verbosity
    VERBOSITY_QUIET,
    VERBOSITY_VERBOSE,
];

fn build_app() -> clap::Command {
    let get_ordering = |arg_name: &str| -> usize {
        match DISPLAY_ORDERING.iter().position(|x| *x == arg_name) {
            Some(idx) => idx,
            None => {
                panic!("argument not assigned a display order: {arg_name:?}");
            }
        }
    };

    //args are not added through method chaining because rustfmt struggles with very long expressions.
    let mut clap_app = clap::Command::new("derain")
        .version(clap::crate_version!())
        .about("Remove rain from a video, one frame at a time");

    clap_app = clap_app.arg(
        clap::Arg::new(INPUT)
            .long("input")
            .short('i')
            .num_args(1)
            .value_parser(value_parser!(PathBuf))
            .default_value(DEFAULT_INPUT_FILE)
            .help("The video to restore")
            .display_order(get_ordering(INPUT)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(OUTPUT)
            .long("output")
            .short('o')
            .num_args(1)
            .value_parser(value_parser!(PathBuf))
            .default_value(DEFAULT_OUTPUT_FILE)
            .help("Where to write the restored video. An existing file is replaced")
            .display_order(get_ordering(OUTPUT)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(WEIGHTS)
            .long("weights")
            .num_args(1)
            .value_parser(value_parser!(PathBuf))
            .required_unless_present(PASSTHROUGH)
            .conflicts_with(PASSTHROUGH)
            .help("Path to the exported (ONNX) restoration model")
            .display_order(get_ordering(WEIGHTS)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(PASSTHROUGH)
            .long("passthrough")
            .help("Do not load a model. Frames are decoded and re-encoded unchanged")
            .action(SetTrue)
            .display_order(get_ordering(PASSTHROUGH)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(GPU)
            .long("gpu")
            .num_args(1)
            .value_parser(value_parser!(u32))
            .help("Run the model on this gpu. When absent the model runs on the cpu")
            .display_order(get_ordering(GPU)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(OUTPUT_INDEX)
            .long("output-index")
            .num_args(1)
            .value_parser(value_parser!(usize))
            .default_value("0")
            .help("Which of the model's outputs holds the restored frame")
            .display_order(get_ordering(OUTPUT_INDEX)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(CODEC)
            .long("codec")
            .num_args(1)
            .default_value(ffmpeg_cmdline_utils::DEFAULT_VIDEO_CODEC)
            .help("ffmpeg video codec for the output (-c:v)")
            .display_order(get_ordering(CODEC)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(PIX_FMT)
            .long("pix-fmt")
            .num_args(1)
            .default_value(ffmpeg_cmdline_utils::DEFAULT_PIX_FMT)
            .help("Pixel format of the encoded output")
            .display_order(get_ordering(PIX_FMT)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(CRF)
            .long("crf")
            .num_args(1)
            .value_parser(value_parser!(u8).range(0..=63))
            .help("Constant rate factor for codecs that support it. Lower is better quality")
            .display_order(get_ordering(CRF)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(VERBOSITY_QUIET)
            .long("quiet")
            .help("Reduced verbosity")
            .conflicts_with(VERBOSITY_VERBOSE)
            .action(SetTrue)
            .display_order(get_ordering(VERBOSITY_QUIET)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(VERBOSITY_VERBOSE)
            .long("verbose")
            .help("Increased verbosity")
            .conflicts_with(VERBOSITY_QUIET)
            .action(SetTrue)
            .display_order(get_ordering(VERBOSITY_VERBOSE)),
    );

    clap_app
}

pub fn parse_args() -> AppCfg {
    let cwd = std::env::current_dir()
        .map_err(|e| eyre::Report::new(e).wrap_err("failed to read the current directory"))
        .unwrap_or_else(|e| print_error_and_quit(e));

    cfg_from_matches(&build_app().get_matches(), &cwd)
}

fn cfg_from_matches(args: &clap::ArgMatches, cwd: &Path) -> AppCfg {
    let path_arg = |id: &str| {
        args.get_one::<PathBuf>(id)
            .map(|p| absolutify_path(cwd, p))
            .unwrap_or_default()
    };

    let model = if args.get_flag(PASSTHROUGH) {
        ModelCfg::Passthrough
    } else {
        ModelCfg::Weights {
            path: path_arg(WEIGHTS),
            restorer: RestorerCfg {
                device: DeviceCfg::from_gpu_id(args.get_one::<u32>(GPU).copied()),
                output_index: args
                    .get_one::<usize>(OUTPUT_INDEX)
                    .copied()
                    .unwrap_or(DEFAULT_OUTPUT_INDEX),
            },
        }
    };

    let mut pipeline = PipelineCfg::default();
    if let Some(codec) = args.get_one::<String>(CODEC) {
        pipeline.encoder.codec = codec.clone();
    }
    if let Some(pix_fmt) = args.get_one::<String>(PIX_FMT) {
        pipeline.encoder.pix_fmt = pix_fmt.clone();
    }
    pipeline.encoder.crf = args.get_one::<u8>(CRF).copied();

    let verbosity = if args.get_flag(VERBOSITY_QUIET) {
        ReportVerbosity::Quiet
    } else if args.get_flag(VERBOSITY_VERBOSE) {
        ReportVerbosity::Verbose
    } else {
        ReportVerbosity::Default
    };

    AppCfg {
        input: path_arg(INPUT),
        output: path_arg(OUTPUT),
        model,
        pipeline,
        verbosity,
    }
}

fn absolutify_path(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        cwd.join(path)
    } else {
        path.to_path_buf()
    }
}
