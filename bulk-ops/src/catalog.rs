//! The catalog of bulk actions offered to the operator.
//!
//! Actions are a closed set of kinds; each kind's descriptor (label, icon,
//! required inputs, destructiveness) is resolved once when the catalog is
//! built, never by string lookup at use time. Hosts with their own action
//! vocabulary can assemble a [`ActionCatalog::custom`] catalog instead.

use bulk_ops_sdk::{has_duplicate_action_ids, ActionId, BulkAction};

/// The standard bulk actions of the management console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Approve pending entities.
    Approve,
    /// Re-enable previously deactivated entities.
    Activate,
    /// Disable entities; operator must say why.
    Deactivate,
    /// Temporarily suspend entities; operator must say why.
    Suspend,
    /// Permanently remove entities; operator must say why.
    Delete,
    /// Send a message to entities; operator must write it.
    Notify,
}

impl ActionKind {
    /// All kinds, in the order they are offered.
    pub const ALL: [ActionKind; 6] = [
        Self::Approve,
        Self::Activate,
        Self::Deactivate,
        Self::Suspend,
        Self::Delete,
        Self::Notify,
    ];

    pub fn id(&self) -> ActionId {
        let id = match self {
            Self::Approve => "approve",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
            Self::Suspend => "suspend",
            Self::Delete => "delete",
            Self::Notify => "notify",
        };
        ActionId::from(id)
    }

    /// Build this kind's immutable descriptor.
    pub fn descriptor(&self) -> BulkAction {
        match self {
            Self::Approve => BulkAction {
                id: self.id(),
                label: "Approve".to_string(),
                requires_reason: false,
                requires_message: false,
                destructive: false,
                icon: "check-circle".to_string(),
            },
            Self::Activate => BulkAction {
                id: self.id(),
                label: "Activate".to_string(),
                requires_reason: false,
                requires_message: false,
                destructive: false,
                icon: "power".to_string(),
            },
            Self::Deactivate => BulkAction {
                id: self.id(),
                label: "Deactivate".to_string(),
                requires_reason: true,
                requires_message: false,
                destructive: true,
                icon: "power-off".to_string(),
            },
            Self::Suspend => BulkAction {
                id: self.id(),
                label: "Suspend".to_string(),
                requires_reason: true,
                requires_message: false,
                destructive: true,
                icon: "pause-circle".to_string(),
            },
            Self::Delete => BulkAction {
                id: self.id(),
                label: "Delete".to_string(),
                requires_reason: true,
                requires_message: false,
                destructive: true,
                icon: "trash-2".to_string(),
            },
            Self::Notify => BulkAction {
                id: self.id(),
                label: "Send message".to_string(),
                requires_reason: false,
                requires_message: true,
                destructive: false,
                icon: "mail".to_string(),
            },
        }
    }
}

/// Read-only, deterministic list of the actions a host may offer.
#[derive(Debug, Clone, Default)]
pub struct ActionCatalog {
    actions: Vec<BulkAction>,
}

impl ActionCatalog {
    /// The built-in set, one descriptor per [`ActionKind`], in order.
    pub fn standard() -> Self {
        Self {
            actions: ActionKind::ALL.iter().map(ActionKind::descriptor).collect(),
        }
    }

    /// A host-defined catalog. Descriptors keep their given order; duplicate
    /// ids are rejected by keeping only the first occurrence.
    pub fn custom(actions: Vec<BulkAction>) -> Self {
        if !has_duplicate_action_ids(&actions) {
            return Self { actions };
        }
        let mut deduped: Vec<BulkAction> = Vec::with_capacity(actions.len());
        for action in actions {
            if deduped.iter().all(|existing| existing.id != action.id) {
                deduped.push(action);
            }
        }
        Self { actions: deduped }
    }

    /// An empty catalog: no actions offered, which is not a failure.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> &[BulkAction] {
        &self.actions
    }

    pub fn find(&self, id: &ActionId) -> Option<&BulkAction> {
        self.actions.iter().find(|action| &action.id == id)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_order_and_lookup() {
        let catalog = ActionCatalog::standard();
        assert_eq!(catalog.len(), ActionKind::ALL.len());

        let ids: Vec<String> = catalog
            .actions()
            .iter()
            .map(|action| action.id.to_string())
            .collect();
        assert_eq!(
            ids,
            vec!["approve", "activate", "deactivate", "suspend", "delete", "notify"]
        );

        let delete = catalog.find(&ActionId::from("delete")).unwrap();
        assert!(delete.destructive);
        assert!(delete.requires_reason);
        assert!(catalog.find(&ActionId::from("nuke")).is_none());
    }

    #[test]
    fn test_required_inputs_per_kind() {
        assert!(!ActionKind::Approve.descriptor().requires_reason);
        assert!(ActionKind::Suspend.descriptor().requires_reason);
        assert!(ActionKind::Notify.descriptor().requires_message);
        assert!(!ActionKind::Notify.descriptor().requires_reason);
    }

    #[test]
    fn test_custom_catalog_drops_duplicate_ids() {
        let first = ActionKind::Approve.descriptor();
        let mut shadow = ActionKind::Approve.descriptor();
        shadow.label = "Approve again".to_string();

        let catalog = ActionCatalog::custom(vec![first, shadow, ActionKind::Delete.descriptor()]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.find(&ActionId::from("approve")).unwrap().label,
            "Approve"
        );
    }

    #[test]
    fn test_empty_catalog_offers_nothing() {
        let catalog = ActionCatalog::empty();
        assert!(catalog.is_empty());
        assert!(catalog.actions().is_empty());
    }
}
