use crate::app::actions::Action;
use crate::app::events::Event;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Reads commands from stdin, one per line, until EOF or the app goes away.
pub fn spawn_input_task(tx: mpsc::Sender<Event>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let Some(action) = map_line_to_action(&line) else {
                        if !line.trim().is_empty() {
                            eprintln!("commands: p = play/pause, n = next, b = previous, l = queue, q = quit");
                        }
                        continue;
                    };
                    if tx.send(Event::Input(action)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "stdin closed");
                    break;
                }
            }
        }
    })
}

pub fn map_line_to_action(line: &str) -> Option<Action> {
    match line.trim().to_ascii_lowercase().as_str() {
        "p" | "play" | "pause" => Some(Action::TogglePlay),
        "n" | "next" => Some(Action::Next),
        "b" | "prev" | "previous" => Some(Action::Previous),
        "l" | "queue" => Some(Action::ShowQueue),
        "q" | "quit" | "exit" => Some(Action::Quit),
        _ => None,
    }
}
