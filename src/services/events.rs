use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use crate::models::{CategoryKind, Question, Questionnaire};

/// Meldung nach einer erfolgreichen Schreiboperation
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    QuestionSaved(Question),
    QuestionRemoved(i64),
    QuestionnaireSaved(Questionnaire),
    QuestionnaireRemoved(i64),
    CategoriesChanged(CategoryKind),
}

/// Verteilt Ereignisse an alle Abonnenten über je einen eigenen Kanal.
#[derive(Default)]
pub struct ChangeBus {
    subscribers: Mutex<Vec<Sender<ChangeEvent>>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    pub fn publish(&self, event: ChangeEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Abonnenten, deren Empfänger weg ist, fallen heraus
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
