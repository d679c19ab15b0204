use crate::config::ConfigError;
use std::collections::HashSet;

/// Integer id assigned to a transaction type at registry construction.
/// Ids start at 1; id 0 is reserved for the invalid sentinel.
pub type TypeId = usize;

/// Declaration of one transaction type, in the order a workload serves them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDef {
    pub name: String,
    pub supplemental: bool,
}

impl TransactionDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supplemental: false,
        }
    }

    /// A type that is only ever invoked from inside another transaction
    /// (e.g. a maintenance job) and must never be selected directly.
    pub fn supplemental(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supplemental: true,
        }
    }
}

/// One logical transaction a workload can execute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionType {
    id: TypeId,
    name: String,
    supplemental: bool,
}

impl TransactionType {
    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_supplemental(&self) -> bool {
        self.supplemental
    }

    /// The id-0 sentinel signalling "no transaction selected".
    pub fn is_invalid(&self) -> bool {
        self.id == 0
    }
}

/// Per-attempt outcome reported by a workload's execute entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// The transaction committed.
    Success,
    /// Run the same transaction type again immediately.
    Retry,
    /// Abandon this selection and pick a new transaction type.
    RetryDifferent,
}

/// Immutable mapping from a workload's transaction names to ids.
///
/// Index 0 always holds the invalid sentinel. Phase weight vectors align
/// with the selectable (non-supplemental) types in definition order.
#[derive(Debug, Clone)]
pub struct TransactionRegistry {
    types: Vec<TransactionType>,
    selectable: Vec<TypeId>,
}

impl TransactionRegistry {
    pub fn new(defs: Vec<TransactionDef>) -> Result<Self, ConfigError> {
        if defs.is_empty() {
            return Err(ConfigError::NoTransactions);
        }

        let mut types = Vec::with_capacity(defs.len() + 1);
        types.push(TransactionType {
            id: 0,
            name: "INVALID".to_string(),
            supplemental: false,
        });

        let mut selectable = Vec::new();
        let mut seen = HashSet::new();
        for (i, def) in defs.into_iter().enumerate() {
            if !seen.insert(def.name.clone()) {
                return Err(ConfigError::DuplicateTransaction(def.name));
            }
            let id = i + 1;
            if !def.supplemental {
                selectable.push(id);
            }
            types.push(TransactionType {
                id,
                name: def.name,
                supplemental: def.supplemental,
            });
        }

        if selectable.is_empty() {
            return Err(ConfigError::NoSelectableTransactions);
        }

        Ok(Self { types, selectable })
    }

    pub fn get(&self, id: TypeId) -> Option<&TransactionType> {
        self.types.get(id)
    }

    pub fn by_name(&self, name: &str) -> Option<&TransactionType> {
        self.types.iter().find(|t| t.name == name)
    }

    /// The type behind the given weight slot.
    pub fn selectable(&self, slot: usize) -> Option<&TransactionType> {
        self.selectable.get(slot).and_then(|id| self.types.get(*id))
    }

    /// Number of non-supplemental types; every phase weight vector must be
    /// exactly this long.
    pub fn selectable_count(&self) -> usize {
        self.selectable.len()
    }

    /// Number of declared types, excluding the sentinel.
    pub fn num_types(&self) -> usize {
        self.types.len() - 1
    }

    /// Slot count for id-indexed tallies (sentinel included).
    pub fn capacity(&self) -> usize {
        self.types.len()
    }

    pub fn invalid(&self) -> &TransactionType {
        &self.types[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransactionType> {
        self.types.iter().skip(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TransactionRegistry {
        TransactionRegistry::new(vec![
            TransactionDef::new("payment"),
            TransactionDef::supplemental("maintenance"),
            TransactionDef::new("lookup"),
        ])
        .unwrap()
    }

    #[test]
    fn assigns_ids_in_definition_order() {
        let reg = registry();
        assert_eq!(reg.by_name("payment").unwrap().id(), 1);
        assert_eq!(reg.by_name("maintenance").unwrap().id(), 2);
        assert_eq!(reg.by_name("lookup").unwrap().id(), 3);
        assert_eq!(reg.num_types(), 3);
    }

    #[test]
    fn weight_slots_skip_supplemental_types() {
        let reg = registry();
        assert_eq!(reg.selectable_count(), 2);
        assert_eq!(reg.selectable(0).unwrap().name(), "payment");
        assert_eq!(reg.selectable(1).unwrap().name(), "lookup");
        assert!(reg.selectable(2).is_none());
    }

    #[test]
    fn reserves_id_zero_for_the_sentinel() {
        let reg = registry();
        assert!(reg.invalid().is_invalid());
        assert!(!reg.by_name("payment").unwrap().is_invalid());
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = TransactionRegistry::new(vec![
            TransactionDef::new("payment"),
            TransactionDef::new("payment"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTransaction(_)));
    }

    #[test]
    fn rejects_a_catalog_with_nothing_selectable() {
        let err =
            TransactionRegistry::new(vec![TransactionDef::supplemental("maintenance")]).unwrap_err();
        assert!(matches!(err, ConfigError::NoSelectableTransactions));
    }
}
