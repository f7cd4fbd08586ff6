//! Declarative list of the workers the supervisor can route to

use std::sync::Arc;

use crate::{
    nodes::{DomainWorker, EscalationNode, Node},
    route::WorkerKind,
};

#[derive(Clone)]
pub struct WorkerEntry {
    pub kind: WorkerKind,
    /// Shown to the supervisor when it picks a worker
    pub description: String,
    pub handler: Arc<dyn Node>,
}

#[derive(Clone, Default)]
pub struct WorkerRegistry {
    entries: Vec<WorkerEntry>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker, replacing any earlier entry of the same kind
    pub fn register(
        mut self,
        kind: WorkerKind,
        description: impl Into<String>,
        handler: Arc<dyn Node>,
    ) -> Self {
        self.entries.retain(|e| e.kind != kind);
        self.entries.push(WorkerEntry {
            kind,
            description: description.into(),
            handler,
        });
        self
    }

    /// The FAQ, subscription, reservation, browsing and escalation workers
    pub fn standard() -> Self {
        Self::new()
            .register(
                WorkerKind::Faq,
                "Answers general questions about the customer's service from the knowledge base.",
                Arc::new(DomainWorker::faq()),
            )
            .register(
                WorkerKind::Subscription,
                "Handles subscription status, tiers and quota, and cancels, reactivates or upgrades subscriptions.",
                Arc::new(DomainWorker::subscription()),
            )
            .register(
                WorkerKind::Reservation,
                "Lists, makes and cancels reservations for experiences.",
                Arc::new(DomainWorker::reservation()),
            )
            .register(
                WorkerKind::Browsing,
                "Helps discover experiences: search, descriptions and availability.",
                Arc::new(DomainWorker::browsing()),
            )
            .register(
                WorkerKind::EscalateToHuman,
                "Hands the conversation to a human agent. Use for fraud, harm, angry users or anything no other worker covers.",
                Arc::new(EscalationNode),
            )
    }

    pub fn get(&self, kind: WorkerKind) -> Option<&WorkerEntry> {
        self.entries.iter().find(|e| e.kind == kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = WorkerKind> + '_ {
        self.entries.iter().map(|e| e.kind)
    }

    /// "- name: description" lines for the supervisor prompt
    pub fn describe(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("- {}: {}", e.kind.name(), e.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_covers_every_worker() {
        let registry = WorkerRegistry::standard();
        for kind in WorkerKind::ALL {
            let entry = registry.get(kind).unwrap();
            assert_eq!(entry.handler.name(), kind.name());
        }
        assert!(registry.describe().contains("- reservation: Lists, makes"));
    }

    #[test]
    fn test_register_replaces_existing_kind() {
        let registry = WorkerRegistry::standard().register(
            WorkerKind::Faq,
            "Only answers questions about opening hours.",
            Arc::new(DomainWorker::faq()),
        );
        assert_eq!(registry.kinds().count(), 5);
        assert!(registry.describe().contains("opening hours"));
    }
}
