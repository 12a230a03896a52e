//! ffmpeg command-line construction.

use bf_plan::{AudioMode, EncodePlan};

/// Render `plan` as the argument list passed to ffmpeg (without the program).
///
/// Order: global flags, progress reporting, input, stream maps, chapter
/// handling, video encoder settings, audio and subtitle codecs, output.
pub fn ffmpeg_args(plan: &EncodePlan) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-nostdin".into()];
    args.push(if plan.overwrite { "-y" } else { "-n" }.into());
    args.extend(["-progress", "pipe:2", "-nostats"].map(String::from));

    args.push("-i".into());
    args.push(plan.input.to_ffmpeg_input());

    args.push("-map".into());
    args.push(format!("0:{}", plan.video.stream_index));
    for index in plan.tracks.audio_indices() {
        args.push("-map".into());
        args.push(format!("0:{index}"));
    }
    for index in plan.tracks.subtitle_indices() {
        args.push("-map".into());
        args.push(format!("0:{index}"));
    }

    args.push("-map_metadata".into());
    args.push("0".into());
    args.push("-map_chapters".into());
    args.push(if plan.preserve_chapters { "0" } else { "-1" }.into());

    args.push("-c:v".into());
    args.push(plan.video.codec.clone());
    args.extend(plan.video.args.iter().cloned());
    args.push("-pix_fmt".into());
    args.push(plan.video.pixel_format.clone());

    if !plan.tracks.audio.is_empty() {
        args.push("-c:a".into());
        args.push(match &plan.audio {
            AudioMode::Copy => "copy".into(),
            AudioMode::Transcode { codec } => codec.clone(),
        });
    }
    if !plan.tracks.subtitles.is_empty() {
        args.push("-c:s".into());
        args.push("copy".into());
    }

    args.push(plan.output.display().to_string());
    args
}
