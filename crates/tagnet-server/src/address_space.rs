// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The in-memory node tree.
//!
//! The address space owns every node for the lifetime of the process. Nodes
//! are created once at server start and mutated in place; there is no
//! deletion and no persistence. A single mutation lock serializes all
//! writes, so a reader always observes a consistent `(value, timestamp)`
//! pair and a publish cycle never samples a torn write.
//!
//! Two write paths exist on purpose:
//!
//! - [`AddressSpace::write`] is the client path and enforces the variable's
//!   access mask.
//! - [`AddressSpace::update`] is the server-internal path used by sources
//!   such as the simulation; it skips the access mask but shares the same
//!   type-check, timestamp, sequence, and notification code.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use tagnet_core::error::{AddressSpaceError, AddressSpaceResult};
use tagnet_core::{AccessLevel, DataType, NodeId, Value};

use crate::notifier::ChangeNotifier;

// =============================================================================
// Nodes
// =============================================================================

/// Variable state stored in the tree.
#[derive(Debug, Clone)]
struct Variable {
    value: Value,
    data_type: DataType,
    access: AccessLevel,
    timestamp: DateTime<Utc>,
    change_seq: u64,
}

/// Node payload: a folder with ordered children, or a variable.
#[derive(Debug, Clone)]
enum NodeKind {
    Folder { children: Vec<NodeId> },
    Variable(Variable),
}

/// A node in the tree. The parent reference is non-owning and used only for
/// traversal; ownership runs strictly from parent to child.
#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    kind: NodeKind,
}

/// Public description of a node, as returned by [`AddressSpace::browse`].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    /// The node's identifier.
    pub node_id: NodeId,

    /// Display name.
    pub name: String,

    /// `true` for folders, `false` for variables.
    pub is_folder: bool,

    /// Declared data type, for variables.
    pub data_type: Option<DataType>,

    /// Access mask, for variables.
    pub access: Option<AccessLevel>,
}

// =============================================================================
// AddressSpace
// =============================================================================

/// The server's node tree.
///
/// All mutating operations (create, write, update) acquire the tree's write
/// lock; reads acquire the read side and observe value/timestamp atomically.
/// The tree is created with a root folder whose ID is [`NodeId::root`].
#[derive(Debug)]
pub struct AddressSpace {
    tree: RwLock<HashMap<NodeId, Node>>,
    notifier: Arc<ChangeNotifier>,
}

impl AddressSpace {
    /// Creates an empty address space containing only the root folder.
    pub fn new(notifier: Arc<ChangeNotifier>) -> Self {
        let mut tree = HashMap::new();
        tree.insert(
            NodeId::root(),
            Node {
                name: "Objects".to_string(),
                parent: None,
                kind: NodeKind::Folder {
                    children: Vec::new(),
                },
            },
        );
        Self {
            tree: RwLock::new(tree),
            notifier,
        }
    }

    /// Returns the change notifier this address space reports into.
    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    // =========================================================================
    // Node creation
    // =========================================================================

    /// Creates a folder under `parent`.
    ///
    /// # Errors
    ///
    /// - `InvalidParent` if `parent` does not exist or is not a folder
    /// - `DuplicateId` if `id` is already present
    pub fn create_folder(
        &self,
        parent: &NodeId,
        id: impl Into<NodeId>,
        name: impl Into<String>,
    ) -> AddressSpaceResult<NodeId> {
        let id = id.into();
        let name = name.into();
        let mut tree = self.tree.write();

        Self::check_new_node(&tree, parent, &id)?;

        tree.insert(
            id.clone(),
            Node {
                name,
                parent: Some(parent.clone()),
                kind: NodeKind::Folder {
                    children: Vec::new(),
                },
            },
        );
        Self::attach_child(&mut tree, parent, &id);

        tracing::debug!(node = %id, "folder created");
        Ok(id)
    }

    /// Creates a variable under `parent`.
    ///
    /// # Errors
    ///
    /// - `InvalidParent` / `DuplicateId` as for [`Self::create_folder`]
    /// - `TypeMismatch` if `initial` does not match `data_type`
    pub fn create_variable(
        &self,
        parent: &NodeId,
        id: impl Into<NodeId>,
        name: impl Into<String>,
        data_type: DataType,
        access: AccessLevel,
        initial: Value,
    ) -> AddressSpaceResult<NodeId> {
        let id = id.into();
        let name = name.into();

        if !initial.matches(data_type) {
            return Err(AddressSpaceError::type_mismatch(
                id,
                data_type,
                initial.data_type(),
            ));
        }

        let mut tree = self.tree.write();
        Self::check_new_node(&tree, parent, &id)?;

        tree.insert(
            id.clone(),
            Node {
                name,
                parent: Some(parent.clone()),
                kind: NodeKind::Variable(Variable {
                    value: initial,
                    data_type,
                    access,
                    timestamp: Utc::now(),
                    change_seq: 0,
                }),
            },
        );
        Self::attach_child(&mut tree, parent, &id);

        tracing::debug!(node = %id, %data_type, %access, "variable created");
        Ok(id)
    }

    fn check_new_node(
        tree: &HashMap<NodeId, Node>,
        parent: &NodeId,
        id: &NodeId,
    ) -> AddressSpaceResult<()> {
        if tree.contains_key(id) {
            return Err(AddressSpaceError::duplicate_id(id.clone()));
        }
        match tree.get(parent) {
            None => Err(AddressSpaceError::invalid_parent(
                id.clone(),
                format!("parent {} does not exist", parent),
            )),
            Some(node) => match node.kind {
                NodeKind::Folder { .. } => Ok(()),
                NodeKind::Variable(_) => Err(AddressSpaceError::invalid_parent(
                    id.clone(),
                    format!("parent {} is not a folder", parent),
                )),
            },
        }
    }

    fn attach_child(tree: &mut HashMap<NodeId, Node>, parent: &NodeId, id: &NodeId) {
        // The parent was validated as an existing folder under the same lock.
        if let Some(Node {
            kind: NodeKind::Folder { children },
            ..
        }) = tree.get_mut(parent)
        {
            children.push(id.clone());
        }
    }

    // =========================================================================
    // Read / write
    // =========================================================================

    /// Reads a variable's value and source timestamp, enforcing the access
    /// mask.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` / `NotAVariable`
    /// - `AccessDenied` if the access mask excludes read
    pub fn read(&self, id: &NodeId) -> AddressSpaceResult<(Value, DateTime<Utc>)> {
        let tree = self.tree.read();
        let var = Self::variable(&tree, id)?;
        if !var.access.can_read() {
            return Err(AddressSpaceError::access_denied(
                id.clone(),
                var.access.to_string(),
            ));
        }
        Ok((var.value.clone(), var.timestamp))
    }

    /// Writes a variable's value through the client path, enforcing the
    /// access mask. On success the timestamp is set to now, the change
    /// sequence is incremented, and the change notifier is invoked.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` / `NotAVariable`
    /// - `AccessDenied` if the access mask excludes write
    /// - `TypeMismatch` if `value` does not match the declared type
    pub fn write(&self, id: &NodeId, value: Value) -> AddressSpaceResult<()> {
        self.apply_write(id, value, true)
    }

    /// Writes a variable's value through the server-internal path, skipping
    /// the client access mask. Shares the type-check/timestamp/sequence/
    /// notify code with [`Self::write`].
    pub fn update(&self, id: &NodeId, value: Value) -> AddressSpaceResult<()> {
        self.apply_write(id, value, false)
    }

    fn apply_write(
        &self,
        id: &NodeId,
        value: Value,
        enforce_access: bool,
    ) -> AddressSpaceResult<()> {
        let mut tree = self.tree.write();
        let var = Self::variable_mut(&mut tree, id)?;

        if enforce_access && !var.access.can_write() {
            return Err(AddressSpaceError::access_denied(
                id.clone(),
                var.access.to_string(),
            ));
        }
        if !value.matches(var.data_type) {
            return Err(AddressSpaceError::type_mismatch(
                id.clone(),
                var.data_type,
                value.data_type(),
            ));
        }

        var.value = value;
        var.timestamp = Utc::now();
        var.change_seq += 1;

        // The notifier lock is a leaf lock; marking dirty under the mutation
        // lock keeps the sequence bump and the dirty mark linearized.
        self.notifier.notify_changed(id);
        Ok(())
    }

    /// Samples a variable for the publish cycle: value, timestamp, and
    /// change sequence observed atomically. No access mask applies; this is
    /// a server-side operation.
    pub fn sample(&self, id: &NodeId) -> AddressSpaceResult<(Value, DateTime<Utc>, u64)> {
        let tree = self.tree.read();
        let var = Self::variable(&tree, id)?;
        Ok((var.value.clone(), var.timestamp, var.change_seq))
    }

    /// Returns a variable's current change sequence.
    pub fn change_sequence(&self, id: &NodeId) -> AddressSpaceResult<u64> {
        let tree = self.tree.read();
        Ok(Self::variable(&tree, id)?.change_seq)
    }

    /// Returns `true` if the node exists and is a variable.
    pub fn is_variable(&self, id: &NodeId) -> bool {
        matches!(
            self.tree.read().get(id),
            Some(Node {
                kind: NodeKind::Variable(_),
                ..
            })
        )
    }

    // =========================================================================
    // Browse
    // =========================================================================

    /// Lists the children of a folder in insertion order.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` if the folder does not exist
    /// - `InvalidParent` if the node is not a folder
    pub fn browse(&self, folder: &NodeId) -> AddressSpaceResult<Vec<NodeInfo>> {
        let tree = self.tree.read();
        let node = tree
            .get(folder)
            .ok_or_else(|| AddressSpaceError::node_not_found(folder.clone()))?;
        let children = match &node.kind {
            NodeKind::Folder { children } => children,
            NodeKind::Variable(_) => {
                return Err(AddressSpaceError::invalid_parent(
                    folder.clone(),
                    format!("{} is not a folder", folder),
                ));
            }
        };

        Ok(children
            .iter()
            .filter_map(|child_id| {
                tree.get(child_id).map(|child| match &child.kind {
                    NodeKind::Folder { .. } => NodeInfo {
                        node_id: child_id.clone(),
                        name: child.name.clone(),
                        is_folder: true,
                        data_type: None,
                        access: None,
                    },
                    NodeKind::Variable(var) => NodeInfo {
                        node_id: child_id.clone(),
                        name: child.name.clone(),
                        is_folder: false,
                        data_type: Some(var.data_type),
                        access: Some(var.access),
                    },
                })
            })
            .collect())
    }

    /// Returns the parent of a node, `None` for the root.
    pub fn parent_of(&self, id: &NodeId) -> AddressSpaceResult<Option<NodeId>> {
        let tree = self.tree.read();
        tree.get(id)
            .map(|node| node.parent.clone())
            .ok_or_else(|| AddressSpaceError::node_not_found(id.clone()))
    }

    // =========================================================================
    // Internal accessors
    // =========================================================================

    fn variable<'a>(
        tree: &'a HashMap<NodeId, Node>,
        id: &NodeId,
    ) -> AddressSpaceResult<&'a Variable> {
        match tree.get(id) {
            None => Err(AddressSpaceError::node_not_found(id.clone())),
            Some(Node {
                kind: NodeKind::Variable(var),
                ..
            }) => Ok(var),
            Some(_) => Err(AddressSpaceError::not_a_variable(id.clone())),
        }
    }

    fn variable_mut<'a>(
        tree: &'a mut HashMap<NodeId, Node>,
        id: &NodeId,
    ) -> AddressSpaceResult<&'a mut Variable> {
        match tree.get_mut(id) {
            None => Err(AddressSpaceError::node_not_found(id.clone())),
            Some(Node {
                kind: NodeKind::Variable(var),
                ..
            }) => Ok(var),
            Some(_) => Err(AddressSpaceError::not_a_variable(id.clone())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> AddressSpace {
        AddressSpace::new(Arc::new(ChangeNotifier::new()))
    }

    #[test]
    fn test_create_and_read() {
        let space = space();
        let before = Utc::now();

        let folder = space
            .create_folder(&NodeId::root(), "3DPrinter", "3D Printer")
            .unwrap();
        let id = space
            .create_variable(
                &folder,
                "3DPrinter/Temperature",
                "Temperature",
                DataType::Double,
                AccessLevel::ReadOnly,
                Value::Double(20.5),
            )
            .unwrap();

        let (value, timestamp) = space.read(&id).unwrap();
        assert_eq!(value, Value::Double(20.5));
        assert!(timestamp >= before);
    }

    #[test]
    fn test_invalid_parent() {
        let space = space();

        let err = space
            .create_folder(&NodeId::new("Missing"), "Child", "Child")
            .unwrap_err();
        assert!(matches!(err, AddressSpaceError::InvalidParent { .. }));

        // A variable cannot parent another node.
        space
            .create_variable(
                &NodeId::root(),
                "Leaf",
                "Leaf",
                DataType::Bool,
                AccessLevel::ReadWrite,
                Value::Bool(false),
            )
            .unwrap();
        let err = space
            .create_folder(&NodeId::new("Leaf"), "Child", "Child")
            .unwrap_err();
        assert!(matches!(err, AddressSpaceError::InvalidParent { .. }));
    }

    #[test]
    fn test_duplicate_id() {
        let space = space();
        space
            .create_folder(&NodeId::root(), "3DPrinter", "3D Printer")
            .unwrap();
        let err = space
            .create_folder(&NodeId::root(), "3DPrinter", "3D Printer")
            .unwrap_err();
        assert!(matches!(err, AddressSpaceError::DuplicateId { .. }));
    }

    #[test]
    fn test_write_read_only_denied() {
        let space = space();
        let id = space
            .create_variable(
                &NodeId::root(),
                "Temperature",
                "Temperature",
                DataType::Double,
                AccessLevel::ReadOnly,
                Value::Double(20.5),
            )
            .unwrap();

        let err = space.write(&id, Value::Double(30.0)).unwrap_err();
        assert!(matches!(err, AddressSpaceError::AccessDenied { .. }));

        // Value and change sequence untouched.
        let (value, _) = space.read(&id).unwrap();
        assert_eq!(value, Value::Double(20.5));
        assert_eq!(space.change_sequence(&id).unwrap(), 0);
    }

    #[test]
    fn test_write_type_mismatch_is_noop() {
        let space = space();
        let id = space
            .create_variable(
                &NodeId::root(),
                "IsActive",
                "IsActive",
                DataType::Bool,
                AccessLevel::ReadWrite,
                Value::Bool(false),
            )
            .unwrap();

        let err = space.write(&id, Value::Double(1.0)).unwrap_err();
        assert!(matches!(err, AddressSpaceError::TypeMismatch { .. }));

        let (value, _) = space.read(&id).unwrap();
        assert_eq!(value, Value::Bool(false));
        assert_eq!(space.change_sequence(&id).unwrap(), 0);
        assert_eq!(space.notifier().total_changes(), 0);
    }

    #[test]
    fn test_write_bumps_sequence_and_notifies() {
        let space = space();
        let id = space
            .create_variable(
                &NodeId::root(),
                "IsActive",
                "IsActive",
                DataType::Bool,
                AccessLevel::ReadWrite,
                Value::Bool(false),
            )
            .unwrap();

        space.write(&id, Value::Bool(true)).unwrap();
        space.write(&id, Value::Bool(false)).unwrap();

        assert_eq!(space.change_sequence(&id).unwrap(), 2);
        assert_eq!(space.notifier().changes_for(&id), 2);
    }

    #[test]
    fn test_update_skips_access_mask() {
        let space = space();
        let id = space
            .create_variable(
                &NodeId::root(),
                "Temperature",
                "Temperature",
                DataType::Double,
                AccessLevel::ReadOnly,
                Value::Double(20.5),
            )
            .unwrap();

        space.update(&id, Value::Double(21.0)).unwrap();
        let (value, _) = space.read(&id).unwrap();
        assert_eq!(value, Value::Double(21.0));
        assert_eq!(space.change_sequence(&id).unwrap(), 1);

        // The internal path still type-checks.
        let err = space.update(&id, Value::Bool(true)).unwrap_err();
        assert!(matches!(err, AddressSpaceError::TypeMismatch { .. }));
    }

    #[test]
    fn test_read_missing_node() {
        let space = space();
        let err = space.read(&NodeId::new("Missing")).unwrap_err();
        assert!(matches!(err, AddressSpaceError::NodeNotFound { .. }));
    }

    #[test]
    fn test_browse_order_and_parent() {
        let space = space();
        let folder = space
            .create_folder(&NodeId::root(), "3DPrinter", "3D Printer")
            .unwrap();
        space
            .create_variable(
                &folder,
                "3DPrinter/Temperature",
                "Temperature",
                DataType::Double,
                AccessLevel::ReadOnly,
                Value::Double(20.5),
            )
            .unwrap();
        space
            .create_variable(
                &folder,
                "3DPrinter/IsActive",
                "IsActive",
                DataType::Bool,
                AccessLevel::ReadWrite,
                Value::Bool(false),
            )
            .unwrap();

        let children = space.browse(&folder).unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].node_id, NodeId::new("3DPrinter/Temperature"));
        assert_eq!(children[1].node_id, NodeId::new("3DPrinter/IsActive"));
        assert_eq!(children[0].data_type, Some(DataType::Double));
        assert_eq!(children[1].access, Some(AccessLevel::ReadWrite));

        assert_eq!(
            space
                .parent_of(&NodeId::new("3DPrinter/Temperature"))
                .unwrap(),
            Some(folder.clone())
        );
        assert_eq!(space.parent_of(&NodeId::root()).unwrap(), None);

        let err = space
            .browse(&NodeId::new("3DPrinter/Temperature"))
            .unwrap_err();
        assert!(matches!(err, AddressSpaceError::InvalidParent { .. }));
    }
}
