//! Permission boundary consulted once per search at plan time.

use std::collections::BTreeSet;

use fedsearch_core::id::FolderId;

pub trait PermissionResolver: Send + Sync {
    /// Folders the caller may read; `None` means every folder.
    fn visible_folders(&self) -> Option<BTreeSet<FolderId>>;

    /// Folders excluded unless a query opts in (trash, spam).
    fn excluded_folders(&self) -> BTreeSet<FolderId>;

    fn allow_private_access(&self) -> bool;

    /// Folders whose private calendar items the caller may still see.
    fn private_access_folders(&self) -> BTreeSet<FolderId>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    pub visible: Option<BTreeSet<FolderId>>,
    pub trash: Option<FolderId>,
    pub spam: Option<FolderId>,
    pub include_trash: bool,
    pub include_spam: bool,
    pub allow_private: bool,
    pub private_folders: BTreeSet<FolderId>,
}

impl StaticPermissions {
    /// Owner access: every folder, private items included.
    pub fn owner() -> Self {
        Self {
            allow_private: true,
            ..Self::default()
        }
    }

    pub fn with_visible<I: IntoIterator<Item = FolderId>>(mut self, folders: I) -> Self {
        self.visible = Some(folders.into_iter().collect());
        self
    }

    pub fn with_trash(mut self, folder: FolderId) -> Self {
        self.trash = Some(folder);
        self
    }

    pub fn with_spam(mut self, folder: FolderId) -> Self {
        self.spam = Some(folder);
        self
    }

    pub fn include_trash(mut self, yes: bool) -> Self {
        self.include_trash = yes;
        self
    }

    pub fn include_spam(mut self, yes: bool) -> Self {
        self.include_spam = yes;
        self
    }

    pub fn allow_private(mut self, yes: bool) -> Self {
        self.allow_private = yes;
        self
    }

    pub fn with_private_folders<I: IntoIterator<Item = FolderId>>(mut self, folders: I) -> Self {
        self.private_folders = folders.into_iter().collect();
        self
    }
}

impl PermissionResolver for StaticPermissions {
    fn visible_folders(&self) -> Option<BTreeSet<FolderId>> {
        self.visible.clone()
    }

    fn excluded_folders(&self) -> BTreeSet<FolderId> {
        let mut out = BTreeSet::new();
        if let (Some(t), false) = (self.trash, self.include_trash) {
            out.insert(t);
        }
        if let (Some(s), false) = (self.spam, self.include_spam) {
            out.insert(s);
        }
        out
    }

    fn allow_private_access(&self) -> bool {
        self.allow_private
    }

    fn private_access_folders(&self) -> BTreeSet<FolderId> {
        self.private_folders.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excluded_folders_respect_opt_in() {
        let p = StaticPermissions::owner()
            .with_trash(FolderId::new(3))
            .with_spam(FolderId::new(4));
        assert_eq!(p.excluded_folders().len(), 2);
        let p = p.include_spam(true);
        assert_eq!(p.excluded_folders(), BTreeSet::from([FolderId::new(3)]));
        assert!(p.visible_folders().is_none());
    }
}
