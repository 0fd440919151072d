//! Storyteller setup prompts.
//!
//! When the storyteller channel delivers a `setup_tasks` batch, each task is
//! presented to a [`TaskResolver`] one at a time, in the order received. A
//! chosen option becomes a `command` message on the active channel; a
//! dismissed prompt sends nothing.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::channel::CommandSink;
use crate::identity::VisitorIdentity;
use crate::protocol::{ClientMessage, ImperativeMessage, Task, TaskId, TaskOption};

/// Presents a task and waits for the storyteller's choice.
#[async_trait]
pub trait TaskResolver: Send {
    /// Returns the chosen option, or `None` if the prompt was dismissed.
    async fn resolve(&mut self, task: &Task) -> Option<TaskOption>;
}

/// What happened to one batch of tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptOutcome {
    /// Tasks answered with a command, in send order.
    pub sent: Vec<TaskId>,
    /// Tasks dismissed, or answered with an option the task did not offer.
    pub skipped: Vec<TaskId>,
    /// Tasks answered while no socket was open; their command was dropped.
    pub undelivered: Vec<TaskId>,
}

impl PromptOutcome {
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty() && self.skipped.is_empty() && self.undelivered.is_empty()
    }
}

/// Drives a [`TaskResolver`] over setup task batches.
pub struct TaskPrompter<R> {
    identity: VisitorIdentity,
    resolver: R,
}

impl<R: TaskResolver> TaskPrompter<R> {
    pub fn new(identity: VisitorIdentity, resolver: R) -> Self {
        Self { identity, resolver }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut R {
        &mut self.resolver
    }

    /// React to one imperative message. Returns `None` unless it carried a
    /// setup task batch.
    pub async fn handle(
        &mut self,
        message: &ImperativeMessage,
        sink: &dyn CommandSink,
    ) -> Option<PromptOutcome> {
        let tasks = message.setup_tasks()?;
        Some(self.on_tasks(tasks, sink).await)
    }

    /// Prompt for each task in order, sending a command for every choice.
    ///
    /// Each task is fully resolved before the next one is presented.
    pub async fn on_tasks(&mut self, tasks: &[Task], sink: &dyn CommandSink) -> PromptOutcome {
        let mut outcome = PromptOutcome::default();
        debug!(visitor = %self.identity.id, count = tasks.len(), "prompting for setup tasks");

        for task in tasks {
            let Some(selection) = self.resolver.resolve(task).await else {
                info!(task_id = task.id, role = %task.role, "setup task dismissed");
                outcome.skipped.push(task.id);
                continue;
            };

            if !task.options.is_empty() && !task.options.contains(&selection) {
                warn!(task_id = task.id, choice = %selection.name, "choice is not one of the task's options");
                outcome.skipped.push(task.id);
                continue;
            }

            if sink.send_message(ClientMessage::command_for(task, selection)) {
                debug!(task_id = task.id, "setup task answered");
                outcome.sent.push(task.id);
            } else {
                warn!(task_id = task.id, "no open channel; answer dropped");
                outcome.undelivered.push(task.id);
            }
        }

        outcome
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted answers by index into each task's options.
    struct Scripted {
        answers: VecDeque<Option<usize>>,
        seen: Vec<TaskId>,
    }

    #[async_trait]
    impl TaskResolver for Scripted {
        async fn resolve(&mut self, task: &Task) -> Option<TaskOption> {
            self.seen.push(task.id);
            let pick = self.answers.pop_front().flatten()?;
            task.options.get(pick).cloned()
        }
    }

    #[derive(Default)]
    struct Recorder {
        open: bool,
        sent: Mutex<Vec<ClientMessage>>,
    }

    impl CommandSink for Recorder {
        fn send_message(&self, message: ClientMessage) -> bool {
            if self.open {
                self.sent.lock().unwrap().push(message);
            }
            self.open
        }
    }

    fn option(id: u64, name: &str) -> TaskOption {
        TaskOption {
            id: json!(id),
            name: name.into(),
            extra: Map::new(),
        }
    }

    fn task(id: TaskId) -> Task {
        Task {
            id,
            kind: "choose_player".into(),
            role: "Washerwoman".into(),
            owner_id: json!(3),
            prompt: "Pick a townsfolk".into(),
            status: "pending".into(),
            options: vec![option(1, "Alice"), option(2, "Bob")],
        }
    }

    fn visitor() -> VisitorIdentity {
        VisitorIdentity {
            id: "st".into(),
            name: "Storyteller".into(),
        }
    }

    #[tokio::test]
    async fn answers_are_sent_in_order() {
        let resolver = Scripted {
            answers: VecDeque::from([Some(0), Some(1)]),
            seen: Vec::new(),
        };
        let mut prompter = TaskPrompter::new(visitor(), resolver);
        let sink = Recorder {
            open: true,
            ..Recorder::default()
        };

        let outcome = prompter.on_tasks(&[task(7), task(8)], &sink).await;
        assert_eq!(outcome.sent, vec![7, 8]);
        assert_eq!(prompter.resolver().seen, vec![7, 8]);

        let sent = sink.sent.lock().unwrap();
        let ClientMessage::Command { id, task } = &sent[0] else {
            panic!("expected command");
        };
        assert_eq!(*id, 7);
        assert_eq!(task.selection.name, "Alice");
        assert_eq!(task.owner_id, json!(3));
    }

    #[tokio::test]
    async fn dismissed_tasks_send_nothing() {
        let resolver = Scripted {
            answers: VecDeque::from([None, Some(1)]),
            seen: Vec::new(),
        };
        let mut prompter = TaskPrompter::new(visitor(), resolver);
        let sink = Recorder {
            open: true,
            ..Recorder::default()
        };

        let outcome = prompter.on_tasks(&[task(1), task(2)], &sink).await;
        assert_eq!(outcome.skipped, vec![1]);
        assert_eq!(outcome.sent, vec![2]);
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn answers_without_a_channel_are_undelivered() {
        let resolver = Scripted {
            answers: VecDeque::from([Some(0)]),
            seen: Vec::new(),
        };
        let mut prompter = TaskPrompter::new(visitor(), resolver);
        let sink = Recorder::default();

        let outcome = prompter.on_tasks(&[task(5)], &sink).await;
        assert_eq!(outcome.undelivered, vec![5]);
        assert!(outcome.sent.is_empty());
    }

    #[tokio::test]
    async fn non_task_messages_are_ignored() {
        let resolver = Scripted {
            answers: VecDeque::new(),
            seen: Vec::new(),
        };
        let mut prompter = TaskPrompter::new(visitor(), resolver);
        let sink = Recorder::default();
        let message = ImperativeMessage::ServerError("room_not_found".into());
        assert!(prompter.handle(&message, &sink).await.is_none());
    }
}
