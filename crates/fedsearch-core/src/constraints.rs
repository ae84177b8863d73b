//! Relational constraint sets.
//!
//! A `Constraints` tree is what a relational leaf hands to the relational
//! store. Clauses are folded into a leaf in place while the query is built;
//! contradictions never raise errors, they set `no_results` instead.

use std::collections::BTreeSet;
use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::clause::Range;
use crate::hit::ItemType;
use crate::id::{AccountId, FolderId, IndexId, ItemId, RemoteId};

/// System tag carried by unread items.
pub const UNREAD_TAG: &str = "\\Unread";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeField {
    Date,
    Size,
}

impl fmt::Display for RangeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeField::Date => f.write_str("DATE"),
            RangeField::Size => f.write_str("SIZE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeConstraint {
    pub field: RangeField,
    pub range: Range,
    pub truth: bool,
}

impl RangeConstraint {
    pub fn matches(&self, v: i64) -> bool {
        self.range.contains(v) == self.truth
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteFolder {
    pub account: AccountId,
    pub folder: FolderId,
}

impl fmt::Display for RemoteFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.account, self.folder)
    }
}

/// Conjunction of simple predicates. Empty sets mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintLeaf {
    pub no_results: bool,
    pub tags: BTreeSet<String>,
    pub exclude_tags: BTreeSet<String>,
    pub folders: BTreeSet<FolderId>,
    pub exclude_folders: BTreeSet<FolderId>,
    pub remote_folders: BTreeSet<RemoteFolder>,
    pub exclude_remote_folders: BTreeSet<RemoteFolder>,
    pub conv_id: Option<ItemId>,
    pub exclude_conv_ids: BTreeSet<ItemId>,
    pub remote_conv_id: Option<RemoteId>,
    pub item_ids: BTreeSet<ItemId>,
    pub exclude_item_ids: BTreeSet<ItemId>,
    pub remote_item_ids: BTreeSet<RemoteId>,
    pub exclude_remote_item_ids: BTreeSet<RemoteId>,
    /// Injected during LUCENE_FIRST execution; not part of the query language.
    pub index_ids: BTreeSet<IndexId>,
    /// Injected during DB_FIRST execution; not part of the query language.
    pub has_index_id: Option<bool>,
    pub types: BTreeSet<ItemType>,
    pub exclude_types: BTreeSet<ItemType>,
    pub ranges: Vec<RangeConstraint>,
    /// Set once trash/spam handling has been decided for this leaf.
    pub spam_trash_setting: bool,
}

impl ConstraintLeaf {
    pub fn add_in_folder(&mut self, folder: FolderId, truth: bool) {
        if truth {
            if (!self.folders.is_empty() && !self.folders.contains(&folder))
                || self.exclude_folders.contains(&folder)
            {
                self.no_results = true;
            }
            self.folders.clear();
            self.folders.insert(folder);
            self.spam_trash_setting = true;
        } else {
            if self.folders.remove(&folder) && self.folders.is_empty() {
                self.no_results = true;
            }
            self.exclude_folders.insert(folder);
        }
    }

    pub fn add_in_remote_folder(&mut self, folder: RemoteFolder, truth: bool) {
        if truth {
            if (!self.remote_folders.is_empty() && !self.remote_folders.contains(&folder))
                || self.exclude_remote_folders.contains(&folder)
            {
                self.no_results = true;
            }
            self.remote_folders.clear();
            self.remote_folders.insert(folder);
            self.spam_trash_setting = true;
        } else {
            if self.remote_folders.remove(&folder) && self.remote_folders.is_empty() {
                self.no_results = true;
            }
            self.exclude_remote_folders.insert(folder);
        }
    }

    /// `is:anywhere` lifts the default trash/spam exclusion; its negation matches nothing.
    pub fn add_anywhere(&mut self, truth: bool) {
        self.spam_trash_setting = true;
        if !truth {
            self.no_results = true;
        }
    }

    pub fn add_tag(&mut self, tag: &str, truth: bool) {
        if truth {
            if self.exclude_tags.contains(tag) {
                self.no_results = true;
            }
            self.tags.insert(tag.to_string());
        } else {
            if self.tags.contains(tag) {
                self.no_results = true;
            }
            self.exclude_tags.insert(tag.to_string());
        }
    }

    pub fn add_conv_id(&mut self, id: ItemId, truth: bool) {
        if truth {
            if self.exclude_conv_ids.contains(&id) || self.conv_id.is_some_and(|c| c != id) {
                self.no_results = true;
            }
            self.conv_id = Some(id);
        } else {
            if self.conv_id == Some(id) {
                self.no_results = true;
            }
            self.exclude_conv_ids.insert(id);
        }
    }

    pub fn add_remote_conv_id(&mut self, id: RemoteId, truth: bool) {
        if truth {
            if self.remote_conv_id.as_ref().is_some_and(|c| *c != id) {
                self.no_results = true;
            }
            self.remote_conv_id = Some(id);
        } else if self.remote_conv_id.as_ref() == Some(&id) {
            self.no_results = true;
        }
    }

    pub fn add_item_ids(&mut self, ids: &BTreeSet<ItemId>, truth: bool) {
        if truth {
            let mut next: BTreeSet<ItemId> = if self.item_ids.is_empty() {
                ids.clone()
            } else {
                self.item_ids.intersection(ids).copied().collect()
            };
            next.retain(|id| !self.exclude_item_ids.contains(id));
            if next.is_empty() {
                self.no_results = true;
            }
            self.item_ids = next;
        } else {
            let constrained = !self.item_ids.is_empty();
            self.item_ids.retain(|id| !ids.contains(id));
            if constrained && self.item_ids.is_empty() {
                self.no_results = true;
            }
            self.exclude_item_ids.extend(ids.iter().copied());
        }
    }

    pub fn add_remote_item_ids(&mut self, ids: &BTreeSet<RemoteId>, truth: bool) {
        if truth {
            let mut next: BTreeSet<RemoteId> = if self.remote_item_ids.is_empty() {
                ids.clone()
            } else {
                self.remote_item_ids.intersection(ids).cloned().collect()
            };
            next.retain(|id| !self.exclude_remote_item_ids.contains(id));
            if next.is_empty() {
                self.no_results = true;
            }
            self.remote_item_ids = next;
        } else {
            let constrained = !self.remote_item_ids.is_empty();
            self.remote_item_ids.retain(|id| !ids.contains(id));
            if constrained && self.remote_item_ids.is_empty() {
                self.no_results = true;
            }
            self.exclude_remote_item_ids.extend(ids.iter().cloned());
        }
    }

    pub fn add_type(&mut self, kind: ItemType, truth: bool) {
        if truth {
            if self.exclude_types.contains(&kind)
                || (!self.types.is_empty() && !self.types.contains(&kind))
            {
                self.no_results = true;
            }
            self.types.clear();
            self.types.insert(kind);
        } else {
            if self.types.remove(&kind) && self.types.is_empty() {
                self.no_results = true;
            }
            self.exclude_types.insert(kind);
        }
    }

    /// Narrow the leaf to the requested result types.
    pub fn restrict_types(&mut self, types: &BTreeSet<ItemType>) {
        if types.is_empty() {
            return;
        }
        if self.types.is_empty() {
            self.types = types.difference(&self.exclude_types).copied().collect();
        } else {
            self.types.retain(|t| types.contains(t));
        }
        if self.types.is_empty() {
            self.no_results = true;
        }
    }

    pub fn add_range(&mut self, field: RangeField, range: Range, truth: bool) {
        if truth && range.is_empty() {
            self.no_results = true;
        }
        self.ranges.push(RangeConstraint {
            field,
            range,
            truth,
        });
    }

    /// `self = self AND other`.
    pub fn and_leaf(&mut self, other: &ConstraintLeaf) {
        if other.spam_trash_setting {
            self.spam_trash_setting = true;
        }
        if self.no_results || other.no_results {
            self.no_results = true;
            return;
        }

        self.tags.extend(other.tags.iter().cloned());
        self.exclude_tags.extend(other.exclude_tags.iter().cloned());
        if !self.tags.is_disjoint(&self.exclude_tags) {
            self.no_results = true;
            return;
        }

        intersect_into(&mut self.folders, &other.folders, &mut self.no_results);
        self.exclude_folders.extend(other.exclude_folders.iter().copied());

        // remote folder includes cannot be intersected without the remote hierarchy
        self.remote_folders.extend(other.remote_folders.iter().cloned());
        self.exclude_remote_folders
            .extend(other.exclude_remote_folders.iter().cloned());

        if let Some(cid) = other.conv_id {
            match self.conv_id {
                Some(mine) if mine != cid => self.no_results = true,
                _ => self.conv_id = Some(cid),
            }
        }
        self.exclude_conv_ids.extend(other.exclude_conv_ids.iter().copied());
        if let Some(cid) = &other.remote_conv_id {
            match &self.remote_conv_id {
                Some(mine) if mine != cid => self.no_results = true,
                _ => self.remote_conv_id = Some(cid.clone()),
            }
        }

        intersect_into(&mut self.item_ids, &other.item_ids, &mut self.no_results);
        self.exclude_item_ids.extend(other.exclude_item_ids.iter().copied());
        intersect_into(
            &mut self.remote_item_ids,
            &other.remote_item_ids,
            &mut self.no_results,
        );
        self.exclude_remote_item_ids
            .extend(other.exclude_remote_item_ids.iter().cloned());
        intersect_into(&mut self.index_ids, &other.index_ids, &mut self.no_results);

        match (self.has_index_id, other.has_index_id) {
            (None, theirs) => self.has_index_id = theirs,
            (Some(mine), Some(theirs)) if mine != theirs => {
                self.no_results = true;
                return;
            }
            _ => {}
        }

        intersect_into(&mut self.types, &other.types, &mut self.no_results);
        self.exclude_types.extend(other.exclude_types.iter().copied());
        self.ranges.extend(other.ranges.iter().copied());
    }

    pub fn ensure_spam_trash_setting(&mut self, exclude: &BTreeSet<FolderId>) {
        if !self.spam_trash_setting {
            self.exclude_folders.extend(exclude.iter().copied());
            self.spam_trash_setting = true;
        }
    }

    /// Constraint-side hint that candidate rows are few.
    pub fn try_db_first(&self) -> bool {
        self.conv_id.is_some() || self.remote_conv_id.is_some() || self.tags.contains(UNREAD_TAG)
    }

    pub fn has_explicit_ids(&self) -> bool {
        !self.item_ids.is_empty()
            || !self.remote_item_ids.is_empty()
            || self.conv_id.is_some()
            || self.remote_conv_id.is_some()
    }

    /// The single folder this leaf selects, when that folder is its only restriction.
    pub fn sole_folder(&self) -> Option<FolderId> {
        let only_folder = self.folders.len() == 1
            && !self.no_results
            && self.tags.is_empty()
            && self.exclude_tags.is_empty()
            && self.remote_folders.is_empty()
            && self.conv_id.is_none()
            && self.exclude_conv_ids.is_empty()
            && self.remote_conv_id.is_none()
            && self.item_ids.is_empty()
            && self.exclude_item_ids.is_empty()
            && self.remote_item_ids.is_empty()
            && self.index_ids.is_empty()
            && self.has_index_id.is_none()
            && self.types.is_empty()
            && self.exclude_types.is_empty()
            && self.ranges.is_empty();
        if only_folder {
            self.folders.iter().next().copied()
        } else {
            None
        }
    }

    pub fn write_query_string(&self, out: &mut String) {
        if self.no_results {
            out.push_str("-IS:anywhere ");
            return;
        }
        write_set(out, "TAG", &self.tags);
        write_set(out, "-TAG", &self.exclude_tags);
        for f in &self.folders {
            let _ = write!(out, "IN:{f} ");
        }
        for f in &self.exclude_folders {
            let _ = write!(out, "-IN:{f} ");
        }
        for f in &self.remote_folders {
            let _ = write!(out, "INID:\"{f}\" ");
        }
        for f in &self.exclude_remote_folders {
            let _ = write!(out, "-INID:\"{f}\" ");
        }
        if let Some(c) = self.conv_id {
            let _ = write!(out, "CONV:{c} ");
        }
        write_set(out, "-CONV", &self.exclude_conv_ids);
        if let Some(c) = &self.remote_conv_id {
            let _ = write!(out, "CONV:\"{c}\" ");
        }
        write_set(out, "ITEM", &self.item_ids);
        write_set(out, "-ITEM", &self.exclude_item_ids);
        for id in &self.remote_item_ids {
            let _ = write!(out, "ITEM:\"{id}\" ");
        }
        for id in &self.exclude_remote_item_ids {
            let _ = write!(out, "-ITEM:\"{id}\" ");
        }
        write_set(out, "INDEXID", &self.index_ids);
        match self.has_index_id {
            Some(true) => out.push_str("HAS_INDEXID "),
            Some(false) => out.push_str("-HAS_INDEXID "),
            None => {}
        }
        write_set(out, "ITEM_TYPE", &self.types);
        write_set(out, "-ITEM_TYPE", &self.exclude_types);
        for r in &self.ranges {
            let _ = write!(
                out,
                "{}{}:{} ",
                if r.truth { "" } else { "-" },
                r.field,
                r.range
            );
        }
    }
}

fn intersect_into<T: Ord + Clone>(mine: &mut BTreeSet<T>, theirs: &BTreeSet<T>, no_results: &mut bool) {
    if theirs.is_empty() {
        return;
    }
    if mine.is_empty() {
        mine.extend(theirs.iter().cloned());
    } else {
        mine.retain(|v| theirs.contains(v));
        if mine.is_empty() {
            *no_results = true;
        }
    }
}

fn write_set<T: fmt::Display>(out: &mut String, label: &str, set: &BTreeSet<T>) {
    if set.is_empty() {
        return;
    }
    out.push_str(label);
    out.push_str(":(");
    for (i, v) in set.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{v}");
    }
    out.push_str(") ");
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constraints {
    Leaf(ConstraintLeaf),
    And(Vec<Constraints>),
    Or(Vec<Constraints>),
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints::Leaf(ConstraintLeaf::default())
    }
}

impl Constraints {
    /// Unconstrained set: every item matches.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn leaf(&self) -> Option<&ConstraintLeaf> {
        match self {
            Constraints::Leaf(l) => Some(l),
            _ => None,
        }
    }

    /// The leaf holding top-level conjuncts, creating one if needed.
    pub fn top_leaf_mut(&mut self) -> &mut ConstraintLeaf {
        match self {
            Constraints::Leaf(l) => l,
            Constraints::And(children) => leaf_child(children),
            or => {
                let taken = std::mem::take(or);
                *or = Constraints::And(vec![Constraints::default(), taken]);
                or.top_leaf_mut()
            }
        }
    }

    /// This node as a leaf; any other shape is replaced by the unconstrained leaf.
    fn leaf_or_reset(&mut self) -> &mut ConstraintLeaf {
        match self {
            Constraints::Leaf(l) => l,
            other => {
                *other = Constraints::default();
                other.leaf_or_reset()
            }
        }
    }

    pub fn and(self, other: Constraints) -> Constraints {
        match (self, other) {
            (Constraints::Leaf(mut a), Constraints::Leaf(b)) => {
                a.and_leaf(&b);
                Constraints::Leaf(a)
            }
            (Constraints::And(mut children), other) => {
                and_into(&mut children, other);
                Constraints::And(children)
            }
            (this, Constraints::And(theirs)) => {
                let mut children = vec![this];
                for c in theirs {
                    and_into(&mut children, c);
                }
                Constraints::And(children)
            }
            (a, b) => Constraints::And(vec![a, b]),
        }
    }

    pub fn or(self, other: Constraints) -> Constraints {
        let mut children = match self {
            Constraints::Or(cs) => cs,
            c => vec![c],
        };
        match other {
            Constraints::Or(cs) => children.extend(cs),
            c => children.push(c),
        }
        Constraints::Or(children)
    }

    pub fn has_no_results(&self) -> bool {
        match self {
            Constraints::Leaf(l) => l.no_results,
            Constraints::And(cs) => cs.iter().any(|c| c.has_no_results()),
            Constraints::Or(cs) => cs.iter().all(|c| c.has_no_results()),
        }
    }

    pub fn has_spam_trash_setting(&self) -> bool {
        match self {
            Constraints::Leaf(l) => l.spam_trash_setting,
            Constraints::And(cs) => cs.iter().any(|c| c.has_spam_trash_setting()),
            Constraints::Or(cs) => cs.iter().all(|c| c.has_spam_trash_setting()),
        }
    }

    pub fn force_spam_trash_setting(&mut self) {
        match self {
            Constraints::Leaf(l) => l.spam_trash_setting = true,
            Constraints::And(cs) | Constraints::Or(cs) => {
                cs.iter_mut().for_each(|c| c.force_spam_trash_setting())
            }
        }
    }

    /// Exclude `folders` unless a trash/spam decision was already made.
    /// Pushed into OR branches so `(tag:a is:anywhere) OR tag:b` only restricts `tag:b`.
    pub fn ensure_spam_trash_setting(&mut self, folders: &BTreeSet<FolderId>) {
        match self {
            Constraints::Leaf(l) => l.ensure_spam_trash_setting(folders),
            Constraints::And(children) => {
                if !children.iter().any(|c| c.has_spam_trash_setting()) {
                    leaf_child(children).ensure_spam_trash_setting(folders);
                }
            }
            Constraints::Or(children) => children
                .iter_mut()
                .for_each(|c| c.ensure_spam_trash_setting(folders)),
        }
    }

    pub fn restrict_types(&mut self, types: &BTreeSet<ItemType>) {
        match self {
            Constraints::Leaf(l) => l.restrict_types(types),
            Constraints::And(cs) | Constraints::Or(cs) => {
                cs.iter_mut().for_each(|c| c.restrict_types(types))
            }
        }
    }

    pub fn try_db_first(&self) -> bool {
        self.leaf().is_some_and(|l| l.try_db_first())
    }

    pub fn has_explicit_ids(&self) -> bool {
        self.leaf().is_some_and(|l| l.has_explicit_ids())
    }

    pub fn sole_folder(&self) -> Option<FolderId> {
        self.leaf().and_then(|l| l.sole_folder())
    }

    pub fn to_query_string(&self) -> String {
        let mut out = String::new();
        self.write_query_string(&mut out);
        out.trim_end().to_string()
    }

    fn write_query_string(&self, out: &mut String) {
        match self {
            Constraints::Leaf(l) => l.write_query_string(out),
            Constraints::And(cs) => {
                for (i, c) in cs.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" AND ");
                    }
                    out.push('(');
                    out.push_str(&c.to_query_string());
                    out.push(')');
                }
            }
            Constraints::Or(cs) => {
                if cs.len() > 1 {
                    out.push('(');
                }
                for (i, c) in cs.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" OR ");
                    }
                    out.push('(');
                    out.push_str(&c.to_query_string());
                    out.push(')');
                }
                if cs.len() > 1 {
                    out.push(')');
                }
            }
        }
    }
}

impl fmt::Display for Constraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.to_query_string();
        if s.is_empty() {
            f.write_str("*")
        } else {
            f.write_str(&s)
        }
    }
}

fn leaf_child(children: &mut Vec<Constraints>) -> &mut ConstraintLeaf {
    let idx = match children.iter().position(|c| matches!(c, Constraints::Leaf(_))) {
        Some(idx) => idx,
        None => {
            children.insert(0, Constraints::default());
            0
        }
    };
    children[idx].leaf_or_reset()
}

fn and_into(children: &mut Vec<Constraints>, other: Constraints) {
    match other {
        Constraints::Leaf(l) => leaf_child(children).and_leaf(&l),
        Constraints::And(theirs) => {
            for c in theirs {
                and_into(children, c);
            }
        }
        or @ Constraints::Or(_) => children.push(or),
    }
}
