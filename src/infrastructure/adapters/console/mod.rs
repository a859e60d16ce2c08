//! Console adapter for development/testing

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use crate::domain::entities::{Event, UserId};
use crate::domain::traits::EventSource;

/// Lines starting with this marker are delivered as button presses
pub const CALLBACK_MARKER: &str = "cb:";

/// Console event source for local development.
///
/// Every input line becomes one event from a fixed chat and user; a line like
/// `cb:menu_page_1` becomes a callback event carrying `menu_page_1`.
pub struct ConsoleSource<R = BufReader<Stdin>> {
    lines: Mutex<Lines<R>>,
    chat_id: i64,
    user_id: UserId,
}

impl ConsoleSource {
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> ConsoleSource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: Mutex::new(reader.lines()),
            chat_id: 1,
            user_id: 1,
        }
    }

    pub fn with_identity(mut self, chat_id: i64, user_id: UserId) -> Self {
        self.chat_id = chat_id;
        self.user_id = user_id;
        self
    }

    fn to_event(&self, line: &str) -> Event {
        match line.strip_prefix(CALLBACK_MARKER) {
            Some(data) => Event::callback(self.chat_id, self.user_id, data.trim()),
            None => Event::new(self.chat_id, self.user_id, line),
        }
    }
}

#[async_trait]
impl<R> EventSource for ConsoleSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_event(&self) -> Option<Event> {
        let mut lines = self.lines.lock().await;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    return Some(self.to_event(line));
                }
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "console read failed");
                    return None;
                }
            }
        }
    }

    async fn reply(&self, _event: &Event, text: &str) {
        println!("[BOT] {}", text);
    }

    fn name(&self) -> &str {
        "console"
    }
}
