//! Rendering of planned stages into ffmpeg argument vectors.
//!
//! The planner never builds strings for the command line itself; this is
//! the only place that knows how ffmpeg spells inputs, maps and codecs.

use std::path::Path;

use crate::container::Codec;
use crate::plan::{FilterChain, FilterGraph, InputSource, MapSource, StreamMap, TranscodePlan, TranscodeStage};

/// Arguments shared by every invocation. Progress goes to stdout as
/// `key=value` lines; stderr only carries errors.
pub const GLOBAL_ARGS: &[&str] = &[
    "-y",
    "-hide_banner",
    "-loglevel",
    "error",
    "-nostats",
    "-progress",
    "pipe:1",
];

/// Full argument vector for one stage, excluding the program name.
pub fn render_stage_args(stage: &TranscodeStage) -> Vec<String> {
    let mut args: Vec<String> = GLOBAL_ARGS.iter().map(|s| s.to_string()).collect();

    for input in &stage.inputs {
        args.extend(input.options.iter().cloned());
        match &input.source {
            InputSource::File(path) => {
                args.push("-i".to_string());
                args.push(path_arg(path));
            }
            InputSource::ConcatList(list) => {
                args.extend(["-f", "concat", "-safe", "0", "-i"].map(String::from));
                args.push(path_arg(list));
            }
            InputSource::Lavfi(graph) => {
                args.extend(["-f", "lavfi", "-i"].map(String::from));
                args.push(graph.clone());
            }
        }
    }

    if let Some(graph) = &stage.filter_graph {
        args.push("-filter_complex".to_string());
        args.push(render_filter_graph(graph));
    }

    for map in &stage.maps {
        args.push("-map".to_string());
        args.push(render_map(map));
    }

    push_codec(&mut args, "-c:v", Some(&stage.codecs.video));
    push_codec(&mut args, "-c:a", stage.codecs.audio.as_ref());
    push_codec(&mut args, "-c:s", stage.codecs.subtitle.as_ref());

    args.extend(stage.output_options.iter().cloned());
    args.push(path_arg(&stage.output));
    args
}

/// One argument vector per stage, in execution order.
pub fn render_plan(plan: &TranscodePlan) -> Vec<Vec<String>> {
    plan.stages.iter().map(render_stage_args).collect()
}

/// Shell-style one-liner for logs and the `plan` command.
pub fn display_command(program: &Path, args: &[String]) -> String {
    let mut line = shell_quote(&program.to_string_lossy());
    for arg in args {
        line.push(' ');
        line.push_str(&shell_quote(arg));
    }
    line
}

pub fn render_filter_graph(graph: &FilterGraph) -> String {
    graph
        .chains
        .iter()
        .map(render_filter_chain)
        .collect::<Vec<_>>()
        .join(";")
}

fn render_filter_chain(chain: &FilterChain) -> String {
    let inputs: String = chain.inputs.iter().map(|l| format!("[{l}]")).collect();
    format!("{inputs}{}[{}]", chain.filters.join(","), chain.output)
}

pub fn render_map(map: &StreamMap) -> String {
    let spec = match &map.source {
        MapSource::Input {
            index,
            kind,
            ordinal,
        } => format!("{index}:{}:{ordinal}", kind.specifier()),
        MapSource::Label(label) => format!("[{label}]"),
    };
    if map.optional {
        format!("{spec}?")
    } else {
        spec
    }
}

fn push_codec(args: &mut Vec<String>, flag: &str, codec: Option<&Codec>) {
    let Some(codec) = codec else {
        return;
    };
    args.push(flag.to_string());
    args.push(codec.name().to_string());
    if let Codec::Encode { options, .. } = codec {
        args.extend(options.iter().cloned());
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Escape a path for use inside a quoted filter option value.
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// One `file` line of a concat demuxer list.
pub fn concat_list_line(path: &Path) -> String {
    format!("file '{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

/// Format a filter factor without float noise: `0.5`, `2`, `0.333333`.
pub fn format_factor(value: f64) -> String {
    let fixed = format!("{value:.6}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
