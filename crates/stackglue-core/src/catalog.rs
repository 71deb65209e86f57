//! Per-scope type catalog.
//!
//! Every bound type gets a dense [`TypeIdx`] (its declaration position) and a
//! category. Classes additionally get a [`MetatableSlot`] and an admission
//! set: every type, itself included, whose values may be passed where the
//! class is expected, each with the [`UpcastPath`] that adapts the reference.
//!
//! Admission sets are computed once, when the catalog is built, from a
//! directed graph whose edges run from derived to base class.

use std::any::TypeId;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;

use crate::class::ClassTarget;
use crate::enumeration::EnumTarget;
use crate::error::BindError;
use crate::ids::{MetatableSlot, ScopeId, TypeIdx};
use crate::instance::{Destroy, Upcast, UpcastPath};

/// Whether a bound type is shared by reference or copied by value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    Class,
    Enum,
}

impl fmt::Display for TypeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeCategory::Class => write!(f, "class"),
            TypeCategory::Enum => write!(f, "enum"),
        }
    }
}

bitflags! {
    /// Summary bits for a catalog entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeFlags: u8 {
        const CLASS = 1 << 0;
        const ENUM = 1 << 1;
        /// Owns a published instance metatable.
        const OWNS_METATABLE = 1 << 2;
        const HAS_BASES = 1 << 3;
        const HAS_DERIVED = 1 << 4;
    }
}

/// Types admitted where a class is expected, with their upcast paths.
pub type AdmissionSet = FxHashMap<TypeIdx, UpcastPath>;

/// One bound type.
pub struct TypeEntry {
    idx: TypeIdx,
    name: Rc<str>,
    category: TypeCategory,
    flags: TypeFlags,
    metatable_slot: Option<MetatableSlot>,
    rust_type: TypeId,
    rust_name: &'static str,
    destroy: Option<Destroy>,
    admission: Rc<AdmissionSet>,
}

impl TypeEntry {
    pub fn idx(&self) -> TypeIdx {
        self.idx
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> TypeCategory {
        self.category
    }

    pub fn flags(&self) -> TypeFlags {
        self.flags
    }

    pub fn metatable_slot(&self) -> Option<MetatableSlot> {
        self.metatable_slot
    }

    pub fn rust_type(&self) -> TypeId {
        self.rust_type
    }

    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    /// Factory destroy of a class.
    pub fn destroy(&self) -> Option<&Destroy> {
        self.destroy.as_ref()
    }

    pub fn admission(&self) -> &AdmissionSet {
        &self.admission
    }

    /// `other` may be passed where this type is expected.
    pub fn admits(&self, other: TypeIdx) -> bool {
        self.admission.contains_key(&other)
    }
}

impl fmt::Debug for TypeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeEntry")
            .field("idx", &self.idx)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("flags", &self.flags)
            .field("metatable_slot", &self.metatable_slot)
            .field("rust_name", &self.rust_name)
            .finish()
    }
}

/// Immutable catalog of one scope.
#[derive(Debug)]
pub struct TypeCatalog {
    scope: ScopeId,
    entries: Vec<TypeEntry>,
    by_type: FxHashMap<TypeId, TypeIdx>,
    by_name: FxHashMap<Rc<str>, TypeIdx>,
    names: Rc<[Rc<str>]>,
    metatable_count: usize,
}

impl TypeCatalog {
    pub fn builder(scope: ScopeId) -> CatalogBuilder {
        CatalogBuilder::new(scope)
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TypeEntry] {
        &self.entries
    }

    pub fn entry(&self, idx: TypeIdx) -> Option<&TypeEntry> {
        self.entries.get(idx.index())
    }

    pub fn by_name(&self, name: &str) -> Option<&TypeEntry> {
        self.entry(*self.by_name.get(name)?)
    }

    pub fn lookup<T: 'static>(&self) -> Option<&TypeEntry> {
        self.entry(*self.by_type.get(&TypeId::of::<T>())?)
    }

    /// Entry of `T`, or `UnboundType` if it was never declared here.
    pub fn require<T: 'static>(&self) -> Result<&TypeEntry, BindError> {
        self.lookup::<T>().ok_or(BindError::UnboundType {
            type_name: std::any::type_name::<T>(),
        })
    }

    /// Bound names indexed by [`TypeIdx`], shared with extraction contexts
    /// for error messages.
    pub fn names(&self) -> &Rc<[Rc<str>]> {
        &self.names
    }

    /// Number of classes, which is also the size of the metatable array.
    pub fn metatable_count(&self) -> usize {
        self.metatable_count
    }

    fn expect_category<T: 'static>(&self, expected: TypeCategory) -> Result<&TypeEntry, BindError> {
        let entry = self.require::<T>()?;
        if entry.category != expected {
            return Err(BindError::CategoryMismatch {
                type_name: entry.name.to_string(),
                expected,
                actual: entry.category,
            });
        }
        Ok(entry)
    }

    /// Extraction context for references to class `T`.
    pub fn class_target<T: 'static>(&self) -> Result<ClassTarget, BindError> {
        let entry = self.expect_category::<T>(TypeCategory::Class)?;
        Ok(ClassTarget::new(
            self.scope,
            entry.idx,
            entry.admission.clone(),
            self.names.clone(),
        ))
    }

    /// Extraction and push context for enum `T`.
    pub fn enum_target<T: 'static>(&self) -> Result<EnumTarget, BindError> {
        let entry = self.expect_category::<T>(TypeCategory::Enum)?;
        Ok(EnumTarget::new(self.scope, entry.idx, self.names.clone()))
    }
}

struct Declaration {
    name: Rc<str>,
    category: TypeCategory,
    rust_type: TypeId,
    rust_name: &'static str,
    destroy: Option<Destroy>,
}

struct BaseLink {
    derived: TypeIdx,
    base: TypeId,
    base_name: &'static str,
    step: Upcast,
}

/// Collects declarations in order, then builds the [`TypeCatalog`].
pub struct CatalogBuilder {
    scope: ScopeId,
    declarations: Vec<Declaration>,
    by_type: FxHashMap<TypeId, TypeIdx>,
    by_name: FxHashMap<Rc<str>, TypeIdx>,
    bases: Vec<BaseLink>,
}

impl CatalogBuilder {
    pub fn new(scope: ScopeId) -> Self {
        Self {
            scope,
            declarations: Vec::new(),
            by_type: FxHashMap::default(),
            by_name: FxHashMap::default(),
            bases: Vec::new(),
        }
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    fn declare<T: 'static>(
        &mut self,
        name: &str,
        category: TypeCategory,
        destroy: Option<Destroy>,
    ) -> Result<TypeIdx, BindError> {
        if name.is_empty() {
            return Err(BindError::EmptyName);
        }
        let rust_type = TypeId::of::<T>();
        if self.by_name.contains_key(name) || self.by_type.contains_key(&rust_type) {
            return Err(BindError::DuplicateType {
                name: name.to_string(),
            });
        }

        let idx = TypeIdx::try_new(self.declarations.len()).ok_or(BindError::TooManyTypes {
            limit: TypeIdx::MAX,
        })?;
        let name: Rc<str> = Rc::from(name);
        self.by_type.insert(rust_type, idx);
        self.by_name.insert(name.clone(), idx);
        self.declarations.push(Declaration {
            name,
            category,
            rust_type,
            rust_name: std::any::type_name::<T>(),
            destroy,
        });
        Ok(idx)
    }

    pub fn declare_class<T: 'static>(&mut self, name: &str, destroy: Destroy) -> Result<TypeIdx, BindError> {
        self.declare::<T>(name, TypeCategory::Class, Some(destroy))
    }

    pub fn declare_enum<T: 'static>(&mut self, name: &str) -> Result<TypeIdx, BindError> {
        self.declare::<T>(name, TypeCategory::Enum, None)
    }

    /// Record that class `derived` can be viewed as `B` through `step`.
    ///
    /// The base does not need to be declared yet; it is resolved by
    /// [`CatalogBuilder::build`].
    pub fn add_base<B: 'static>(&mut self, derived: TypeIdx, step: Upcast) {
        self.bases.push(BaseLink {
            derived,
            base: TypeId::of::<B>(),
            base_name: std::any::type_name::<B>(),
            step,
        });
    }

    pub fn build(self) -> Result<TypeCatalog, BindError> {
        let mut graph: DiGraph<TypeIdx, Upcast> = DiGraph::with_capacity(self.declarations.len(), self.bases.len());
        for index in 0..self.declarations.len() {
            graph.add_node(TypeIdx::new(index));
        }

        for link in &self.bases {
            let base = *self.by_type.get(&link.base).ok_or(BindError::UnboundType {
                type_name: link.base_name,
            })?;
            for idx in [link.derived, base] {
                let declaration = self
                    .declarations
                    .get(idx.index())
                    .ok_or(BindError::UnknownType { idx })?;
                if declaration.category != TypeCategory::Class {
                    return Err(BindError::CategoryMismatch {
                        type_name: declaration.name.to_string(),
                        expected: TypeCategory::Class,
                        actual: declaration.category,
                    });
                }
            }
            graph.add_edge(
                NodeIndex::new(link.derived.index()),
                NodeIndex::new(base.index()),
                link.step,
            );
        }

        if let Some(idx) = first_in_cycle(&graph) {
            let type_name = self
                .declarations
                .get(idx.index())
                .map(|declaration| declaration.name.to_string())
                .unwrap_or_default();
            return Err(BindError::CyclicHierarchy { type_name });
        }

        let names: Rc<[Rc<str>]> = self
            .declarations
            .iter()
            .map(|declaration| declaration.name.clone())
            .collect();

        let mut metatable_count = 0;
        let mut entries = Vec::with_capacity(self.declarations.len());
        for (index, declaration) in self.declarations.into_iter().enumerate() {
            let node = NodeIndex::new(index);
            let mut flags = match declaration.category {
                TypeCategory::Class => TypeFlags::CLASS | TypeFlags::OWNS_METATABLE,
                TypeCategory::Enum => TypeFlags::ENUM,
            };
            if graph.edges_directed(node, Direction::Outgoing).next().is_some() {
                flags |= TypeFlags::HAS_BASES;
            }
            if graph.edges_directed(node, Direction::Incoming).next().is_some() {
                flags |= TypeFlags::HAS_DERIVED;
            }

            let metatable_slot = (declaration.category == TypeCategory::Class).then(|| {
                metatable_count += 1;
                MetatableSlot::new(metatable_count - 1)
            });

            entries.push(TypeEntry {
                idx: TypeIdx::new(index),
                name: declaration.name,
                category: declaration.category,
                flags,
                metatable_slot,
                rust_type: declaration.rust_type,
                rust_name: declaration.rust_name,
                destroy: declaration.destroy,
                admission: Rc::new(admission_set(&graph, node)),
            });
        }

        Ok(TypeCatalog {
            scope: self.scope,
            entries,
            by_type: self.by_type,
            by_name: self.by_name,
            names,
            metatable_count,
        })
    }
}

/// Lowest index lying on a cycle, if the hierarchy has one.
fn first_in_cycle(graph: &DiGraph<TypeIdx, Upcast>) -> Option<TypeIdx> {
    tarjan_scc(graph)
        .into_iter()
        .filter_map(|component| match component.as_slice() {
            [node] if !graph.contains_edge(*node, *node) => None,
            nodes => nodes.iter().map(|node| graph[*node]).min(),
        })
        .min()
}

/// Breadth-first walk over derived-to-base edges pointing at `target`.
///
/// The path of a type is its own edge followed by the path of the base the
/// edge leads to, so applying it turns a derived value into `target`.
fn admission_set(graph: &DiGraph<TypeIdx, Upcast>, target: NodeIndex) -> AdmissionSet {
    let mut admitted = AdmissionSet::default();
    admitted.insert(graph[target], UpcastPath::identity());

    let mut queue = VecDeque::from([target]);
    while let Some(base) = queue.pop_front() {
        let base_path = admitted[&graph[base]].clone();
        for edge in graph.edges_directed(base, Direction::Incoming) {
            let derived = graph[edge.source()];
            if admitted.contains_key(&derived) {
                continue;
            }
            let path = UpcastPath::single(*edge.weight()).then(&base_path);
            admitted.insert(derived, path);
            queue.push_back(edge.source());
        }
    }
    admitted
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use super::*;
    use crate::instance::upcast;

    struct Animal;
    struct Dog {
        animal: Animal,
    }
    struct Puppy {
        dog: Dog,
    }
    struct Rock;
    #[derive(Clone, Copy)]
    enum Color {}

    impl AsMut<Animal> for Dog {
        fn as_mut(&mut self) -> &mut Animal {
            &mut self.animal
        }
    }

    impl AsMut<Dog> for Puppy {
        fn as_mut(&mut self) -> &mut Dog {
            &mut self.dog
        }
    }

    fn noop() -> Destroy {
        Rc::new(|_: Box<dyn Any>| {})
    }

    fn hierarchy() -> TypeCatalog {
        let mut builder = TypeCatalog::builder(ScopeId::next());
        let puppy = builder.declare_class::<Puppy>("Puppy", noop()).unwrap();
        builder.add_base::<Dog>(puppy, upcast::<Puppy, Dog>);
        let dog = builder.declare_class::<Dog>("Dog", noop()).unwrap();
        builder.add_base::<Animal>(dog, upcast::<Dog, Animal>);
        builder.declare_enum::<Color>("Color").unwrap();
        builder.declare_class::<Animal>("Animal", noop()).unwrap();
        builder.declare_class::<Rock>("Rock", noop()).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn indices_follow_declaration_order() {
        let catalog = hierarchy();
        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.by_name("Puppy").unwrap().idx(), TypeIdx::new(0));
        assert_eq!(catalog.lookup::<Color>().unwrap().idx(), TypeIdx::new(2));
        assert_eq!(&*catalog.names()[3], "Animal");
    }

    #[test]
    fn metatable_slots_skip_enums() {
        let catalog = hierarchy();
        assert_eq!(catalog.metatable_count(), 4);
        assert_eq!(
            catalog.lookup::<Animal>().unwrap().metatable_slot(),
            Some(MetatableSlot::new(2))
        );
        assert_eq!(catalog.lookup::<Color>().unwrap().metatable_slot(), None);
    }

    #[test]
    fn admission_is_transitive() {
        let catalog = hierarchy();
        let animal = catalog.lookup::<Animal>().unwrap();
        let dog = catalog.lookup::<Dog>().unwrap().idx();
        let puppy = catalog.lookup::<Puppy>().unwrap().idx();
        let rock = catalog.lookup::<Rock>().unwrap().idx();

        assert!(animal.admits(animal.idx()));
        assert!(animal.admits(dog));
        assert!(animal.admits(puppy));
        assert!(!animal.admits(rock));
        assert_eq!(animal.admission()[&puppy].len(), 2);

        let dog_entry = catalog.lookup::<Dog>().unwrap();
        assert!(!dog_entry.admits(animal.idx()));
        assert!(dog_entry.flags().contains(TypeFlags::HAS_BASES | TypeFlags::HAS_DERIVED));
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut builder = TypeCatalog::builder(ScopeId::next());
        builder.declare_class::<Animal>("Thing", noop()).unwrap();
        let err = builder.declare_class::<Rock>("Thing", noop()).unwrap_err();
        assert_eq!(err, BindError::DuplicateType { name: "Thing".into() });
    }

    #[test]
    fn undeclared_base_is_unbound() {
        let mut builder = TypeCatalog::builder(ScopeId::next());
        let dog = builder.declare_class::<Dog>("Dog", noop()).unwrap();
        builder.add_base::<Animal>(dog, upcast::<Dog, Animal>);
        let err = builder.build().unwrap_err();
        assert!(matches!(err, BindError::UnboundType { .. }));
    }

    #[test]
    fn cycles_rejected() {
        let mut builder = TypeCatalog::builder(ScopeId::next());
        let dog = builder.declare_class::<Dog>("Dog", noop()).unwrap();
        builder.add_base::<Dog>(dog, |value| Some(value));
        let err = builder.build().unwrap_err();
        assert!(matches!(err, BindError::CyclicHierarchy { .. }));
    }

    #[test]
    fn cycle_error_names_a_member_of_the_cycle() {
        struct Left;
        struct Right;

        let mut builder = TypeCatalog::builder(ScopeId::next());
        let dog = builder.declare_class::<Dog>("Dog", noop()).unwrap();
        builder.add_base::<Animal>(dog, upcast::<Dog, Animal>);
        builder.declare_class::<Animal>("Animal", noop()).unwrap();
        let left = builder.declare_class::<Left>("Left", noop()).unwrap();
        builder.add_base::<Right>(left, |value| Some(value));
        let right = builder.declare_class::<Right>("Right", noop()).unwrap();
        builder.add_base::<Left>(right, |value| Some(value));

        let err = builder.build().unwrap_err();
        assert_eq!(err, BindError::CyclicHierarchy { type_name: "Left".into() });
    }

    #[test]
    fn unissued_index_rejected() {
        let mut builder = TypeCatalog::builder(ScopeId::next());
        builder.declare_class::<Animal>("Animal", noop()).unwrap();
        builder.add_base::<Animal>(TypeIdx::new(7), |value| Some(value));
        let err = builder.build().unwrap_err();
        assert_eq!(err, BindError::UnknownType { idx: TypeIdx::new(7) });
    }

    #[test]
    fn category_checks() {
        let catalog = hierarchy();
        assert!(catalog.class_target::<Dog>().is_ok());
        assert!(matches!(
            catalog.class_target::<Color>(),
            Err(BindError::CategoryMismatch { .. })
        ));
        assert!(matches!(
            catalog.enum_target::<u32>(),
            Err(BindError::UnboundType { .. })
        ));
    }
}
