#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    TogglePlay,
    Next,
    Previous,
    /// Re-print the queue.
    ShowQueue,
}
