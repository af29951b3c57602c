use anyhow::Result;
use codeplay_unlock::{GameStatus, UnlockState};
use std::io::{self, Write};

/// Write one line to stdout, treating a closed pipe as success.
pub fn print_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

pub fn describe_state(state: &UnlockState, lines_required: u64) -> String {
    match state {
        UnlockState::Unlocked { plays_remaining: 1 } => "unlocked, 1 play left".to_string(),
        UnlockState::Unlocked { plays_remaining } => {
            format!("unlocked, {plays_remaining} plays left")
        }
        UnlockState::Locked { progress_lines } => {
            format!("locked, {progress_lines}/{lines_required} lines")
        }
    }
}

pub fn render_status(total_lines: u64, statuses: &[GameStatus]) -> String {
    let id_width = statuses
        .iter()
        .map(|status| status.game.id.len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    out.push_str(&format!("Lines written: {total_lines}\n"));
    for status in statuses {
        out.push_str(&format!(
            "{:<id_width$}  {:<28}  best {}\n",
            status.game.id,
            describe_state(&status.state, status.lines_required),
            status.stats.high_score,
        ));
    }
    out.truncate(out.trim_end().len());
    out
}
