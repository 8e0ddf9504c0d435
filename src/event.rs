use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Shell events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  /// A line typed by the user
  Input(String),
  /// Message from background work, e.g. a delayed send settling
  Notice(String),
  /// Standard input closed
  Eof,
}

/// Event handler that merges stdin lines with notices from spawned tasks
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    let input_tx = tx.clone();
    tokio::spawn(async move {
      let mut lines = BufReader::new(tokio::io::stdin()).lines();
      while let Ok(Some(line)) = lines.next_line().await {
        if input_tx.send(Event::Input(line)).is_err() {
          return;
        }
      }
      let _ = input_tx.send(Event::Eof);
    });

    Self { tx, rx }
  }

  /// Sender for background tasks to post notices
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
