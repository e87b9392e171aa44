//! Reuse-or-replace decisions for mounted instances.
//!
//! Every mount point (a layer, a slot, a child position) holds at most one
//! instance. Given the next model for that point, the instance is reused and
//! updated in place when its type matches the expected type case-insensitively,
//! otherwise a new instance is constructed and takes its place.
//!
//! Children are matched by position, not by key. Reordering records gives the
//! existing child at each index the record now at that index. Link
//! discriminators are row indexes, so this positional identity is relied on.

use std::fmt;

use indexmap::IndexMap;

/// Type identifier of a mounted instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstanceType {
    /// Generic container used when no component or layout is named.
    Container,
    Named {
        namespace: Option<String>,
        name: String,
    },
}

impl InstanceType {
    pub const CONTAINER_TAG: &'static str = "div";

    /// A design-namespaced type, `lcars` + `table` → `lcars-table`.
    pub fn named(namespace: Option<&str>, name: &str) -> Self {
        Self::Named {
            namespace: namespace.map(str::to_owned),
            name: name.to_owned(),
        }
    }

    /// A plain element type without namespace, e.g. a table row.
    pub fn element(name: &str) -> Self {
        Self::named(None, name)
    }

    pub fn tag(&self) -> String {
        match self {
            Self::Container => Self::CONTAINER_TAG.to_owned(),
            Self::Named {
                namespace: Some(namespace),
                name,
            } => format!("{namespace}-{name}"),
            Self::Named {
                namespace: None,
                name,
            } => name.clone(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Container => None,
            Self::Named { name, .. } => Some(name),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Container => None,
            Self::Named { namespace, .. } => namespace.as_deref(),
        }
    }

    /// Case-insensitive key used for comparisons and registry lookups.
    pub fn key(&self) -> String {
        self.tag().to_ascii_lowercase()
    }

    /// Whether an instance of type `self` can be reused for `expected`.
    pub fn matches(&self, expected: &InstanceType) -> bool {
        self.tag().eq_ignore_ascii_case(&expected.tag())
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

/// Anything mounted at a reconciled position.
pub trait Typed {
    fn instance_type(&self) -> &InstanceType;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Reused,
    Replaced,
    Appended,
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub reused: usize,
    pub replaced: usize,
    pub appended: usize,
    pub removed: usize,
}

impl ReconcileReport {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Reused => self.reused += 1,
            Outcome::Replaced => self.replaced += 1,
            Outcome::Appended => self.appended += 1,
        }
    }

    pub fn merge(&mut self, other: ReconcileReport) {
        self.reused += other.reused;
        self.replaced += other.replaced;
        self.appended += other.appended;
        self.removed += other.removed;
    }

    /// True when nothing was constructed or removed.
    pub fn is_reuse_only(&self) -> bool {
        self.replaced == 0 && self.appended == 0 && self.removed == 0
    }
}

/// Reconciles a single mount point.
///
/// An empty point counts as an append. The instance left in `slot` is always
/// updated with the new model.
pub fn reconcile_one<C, E>(
    slot: &mut Option<C>,
    expected: &InstanceType,
    create: impl FnOnce(&InstanceType) -> Result<C, E>,
    update: impl FnOnce(&mut C) -> Result<(), E>,
) -> Result<Outcome, E>
where
    C: Typed,
{
    let outcome = match slot {
        Some(existing) if existing.instance_type().matches(expected) => Outcome::Reused,
        Some(_) => {
            *slot = Some(create(expected)?);
            Outcome::Replaced
        }
        None => {
            *slot = Some(create(expected)?);
            Outcome::Appended
        }
    };
    if let Some(instance) = slot {
        update(instance)?;
    }
    log::trace!("reconcile {expected}: {outcome:?}");
    Ok(outcome)
}

/// Reconciles `children` against `sources` by index and truncates the rest.
pub fn reconcile_children<S, C, E>(
    children: &mut Vec<C>,
    sources: &[S],
    mut expected: impl FnMut(&S) -> Result<InstanceType, E>,
    mut create: impl FnMut(&InstanceType, &S, usize) -> Result<C, E>,
    mut update: impl FnMut(&mut C, &S, usize) -> Result<(), E>,
) -> Result<ReconcileReport, E>
where
    C: Typed,
{
    let mut report = ReconcileReport::default();
    for (index, source) in sources.iter().enumerate() {
        let expected = expected(source)?;
        let reusable = children
            .get(index)
            .is_some_and(|child| child.instance_type().matches(&expected));
        if reusable {
            report.record(Outcome::Reused);
        } else {
            let child = create(&expected, source, index)?;
            if index < children.len() {
                children[index] = child;
                report.record(Outcome::Replaced);
            } else {
                children.push(child);
                report.record(Outcome::Appended);
            }
        }
        update(&mut children[index], source, index)?;
    }
    report.removed = children.len().saturating_sub(sources.len());
    children.truncate(sources.len());
    Ok(report)
}

/// Drops every named mount whose name is not in `present`. Returns how many
/// were removed.
pub fn remove_absent<C>(mounts: &mut IndexMap<String, C>, present: &[&str]) -> usize {
    let before = mounts.len();
    mounts.retain(|name, _| present.contains(&name.as_str()));
    before - mounts.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Child {
        ty: InstanceType,
        generation: usize,
        value: String,
        updates: usize,
    }

    impl Typed for Child {
        fn instance_type(&self) -> &InstanceType {
            &self.ty
        }
    }

    fn run(children: &mut Vec<Child>, sources: &[(&str, &str)], generation: usize) -> ReconcileReport {
        reconcile_children::<_, _, ()>(
            children,
            sources,
            |(ty, _)| Ok(InstanceType::element(ty)),
            |ty, _, _| {
                Ok(Child {
                    ty: ty.clone(),
                    generation,
                    value: String::new(),
                    updates: 0,
                })
            },
            |child, (_, value), _| {
                child.value = (*value).to_owned();
                child.updates += 1;
                Ok(())
            },
        )
        .unwrap()
    }

    #[test]
    fn identical_sources_reuse_every_child() {
        let mut children = Vec::new();
        let sources = [("tr", "a"), ("tr", "b")];
        run(&mut children, &sources, 0);
        let report = run(&mut children, &sources, 1);

        assert!(report.is_reuse_only());
        assert_eq!(report.reused, 2);
        assert!(children.iter().all(|child| child.generation == 0 && child.updates == 2));
    }

    #[test]
    fn truncation_keeps_the_leading_children() {
        let mut children = Vec::new();
        run(&mut children, &[("tr", "a"), ("tr", "b"), ("tr", "c")], 0);
        let report = run(&mut children, &[("tr", "c")], 1);

        assert_eq!(children.len(), 1);
        assert_eq!(report.removed, 2);
        assert_eq!(report.reused, 1);
        assert_eq!(children[0].generation, 0);
        assert_eq!(children[0].value, "c");
    }

    #[test]
    fn type_change_replaces_only_that_position() {
        let mut children = Vec::new();
        run(&mut children, &[("button", "a"), ("button", "b")], 0);
        let report = run(&mut children, &[("button", "a"), ("select", "b"), ("button", "c")], 1);

        assert_eq!(
            report,
            ReconcileReport {
                reused: 1,
                replaced: 1,
                appended: 1,
                removed: 0
            }
        );
        assert_eq!(children[0].generation, 0);
        assert_eq!(children[1].generation, 1);
        assert_eq!(children[1].ty, InstanceType::element("select"));
    }

    #[test]
    fn type_comparison_ignores_case() {
        let mut children = Vec::new();
        run(&mut children, &[("LCARS-Table", "a")], 0);
        let report = run(&mut children, &[("lcars-table", "a")], 1);

        assert_eq!(report.reused, 1);
        assert!(InstanceType::named(Some("LCARS"), "Text").matches(&InstanceType::named(Some("lcars"), "text")));
        assert!(!InstanceType::Container.matches(&InstanceType::element("span")));
    }

    #[test]
    fn single_mount_point() {
        let mut slot: Option<Child> = None;
        let make = |generation| {
            move |ty: &InstanceType| -> Result<Child, ()> {
                Ok(Child {
                    ty: ty.clone(),
                    generation,
                    value: String::new(),
                    updates: 0,
                })
            }
        };
        let touch = |child: &mut Child| -> Result<(), ()> {
            child.updates += 1;
            Ok(())
        };

        let text = InstanceType::named(Some("lcars"), "text");
        let table = InstanceType::named(Some("lcars"), "table");
        assert_eq!(reconcile_one(&mut slot, &text, make(0), touch), Ok(Outcome::Appended));
        assert_eq!(reconcile_one(&mut slot, &text, make(1), touch), Ok(Outcome::Reused));
        assert_eq!(slot.as_ref().map(|c| (c.generation, c.updates)), Some((0, 2)));
        assert_eq!(reconcile_one(&mut slot, &table, make(2), touch), Ok(Outcome::Replaced));
        assert_eq!(slot.as_ref().map(|c| (c.generation, c.updates)), Some((2, 1)));
    }

    #[test]
    fn absent_names_are_removed() {
        let mut mounts: IndexMap<String, u8> = IndexMap::new();
        mounts.insert("main".to_owned(), 0);
        mounts.insert("dialog".to_owned(), 1);

        assert_eq!(remove_absent(&mut mounts, &["main"]), 1);
        assert!(mounts.contains_key("main"));
        assert!(!mounts.contains_key("dialog"));
    }

    #[test]
    fn container_and_tags() {
        assert_eq!(InstanceType::Container.tag(), "div");
        assert_eq!(InstanceType::named(None, "view").tag(), "view");
        assert_eq!(InstanceType::named(Some("lcars"), "view").to_string(), "lcars-view");
        assert_eq!(InstanceType::named(Some("Lcars"), "View").key(), "lcars-view");
    }
}
