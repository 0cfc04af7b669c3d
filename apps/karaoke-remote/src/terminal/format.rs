use crate::session::PlayerState;

const BAR_WIDTH: usize = 20;

/// `m:ss` for a millisecond offset. Unknown (negative) values read as `0:00`.
pub fn format_clock(ms: i64) -> String {
    let seconds = ms.max(0) / 1_000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn progress_bar(ratio: Option<f64>, width: usize) -> String {
    let filled = ratio
        .map(|ratio| (ratio.clamp(0.0, 1.0) * width as f64).round() as usize)
        .unwrap_or(0)
        .min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

pub fn now_playing(state: &PlayerState) -> String {
    let Some(song) = state.current_song.as_ref() else {
        return "■ nothing playing".to_string();
    };
    let marker = if state.is_playing { "▶" } else { "⏸" };
    format!(
        "{marker} {song}  {} / {} {}",
        format_clock(state.current_position_ms),
        format_clock(state.duration_ms),
        progress_bar(state.progress(), BAR_WIDTH)
    )
}
