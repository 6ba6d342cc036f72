//! Append-only conversation transcript.

use serde::Serialize;

use crate::core::types::Turn;

/// Ordered turns of one run. Turns are only ever appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Render as `role: content` lines, the prompt shape every provider receives.
    pub fn render(&self) -> String {
        let mut buf = String::new();
        for turn in &self.turns {
            buf.push_str(turn.role.as_str());
            buf.push_str(": ");
            buf.push_str(&turn.content);
            buf.push('\n');
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_preserves_order_and_roles() {
        let mut transcript = Transcript::new();
        transcript.push(Turn::system("rules"));
        transcript.push(Turn::user("hello"));
        transcript.push(Turn::assistant("{}"));
        assert_eq!(transcript.render(), "system: rules\nuser: hello\nassistant: {}\n");
        assert_eq!(transcript.len(), 3);
    }
}
