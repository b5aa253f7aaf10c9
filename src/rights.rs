//! FD rights bit-sets and the inheritance rule applied on `path_open` (§3 "Rights").

use bitflags::bitflags;

bitflags! {
    /// Operations permitted on an FD (`rights_base`) or inheritable by FDs derived from it
    /// (`rights_inheriting`). Mirrors the WASI preview-1 `rights` bit layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Rights: u64 {
        const FD_DATASYNC             = 1 << 0;
        const FD_READ                 = 1 << 1;
        const FD_SEEK                 = 1 << 2;
        const FD_FDSTAT_SET_FLAGS     = 1 << 3;
        const FD_SYNC                 = 1 << 4;
        const FD_TELL                 = 1 << 5;
        const FD_WRITE                = 1 << 6;
        const FD_ADVISE               = 1 << 7;
        const FD_ALLOCATE             = 1 << 8;
        const PATH_CREATE_DIRECTORY   = 1 << 9;
        const PATH_CREATE_FILE        = 1 << 10;
        const PATH_LINK_SOURCE        = 1 << 11;
        const PATH_LINK_TARGET        = 1 << 12;
        const PATH_OPEN               = 1 << 13;
        const FD_READDIR               = 1 << 14;
        const PATH_READLINK           = 1 << 15;
        const PATH_RENAME_SOURCE      = 1 << 16;
        const PATH_RENAME_TARGET      = 1 << 17;
        const PATH_FILESTAT_GET       = 1 << 18;
        const PATH_FILESTAT_SET_SIZE  = 1 << 19;
        const PATH_FILESTAT_SET_TIMES = 1 << 20;
        const FD_FILESTAT_GET         = 1 << 21;
        const FD_FILESTAT_SET_SIZE    = 1 << 22;
        const FD_FILESTAT_SET_TIMES   = 1 << 23;
        const PATH_SYMLINK            = 1 << 24;
        const PATH_REMOVE_DIRECTORY   = 1 << 25;
        const PATH_UNLINK_FILE        = 1 << 26;
        const POLL_FD_READWRITE       = 1 << 27;

        /// Bits that only make sense on a directory FD — never carried into a file's
        /// `rights_base` even if requested and permitted by the parent's inheriting set.
        const DIRECTORY_ONLY = Self::PATH_CREATE_DIRECTORY.bits()
            | Self::PATH_CREATE_FILE.bits()
            | Self::PATH_LINK_SOURCE.bits()
            | Self::PATH_LINK_TARGET.bits()
            | Self::PATH_OPEN.bits()
            | Self::FD_READDIR.bits()
            | Self::PATH_READLINK.bits()
            | Self::PATH_RENAME_SOURCE.bits()
            | Self::PATH_RENAME_TARGET.bits()
            | Self::PATH_FILESTAT_GET.bits()
            | Self::PATH_FILESTAT_SET_SIZE.bits()
            | Self::PATH_FILESTAT_SET_TIMES.bits()
            | Self::PATH_SYMLINK.bits()
            | Self::PATH_REMOVE_DIRECTORY.bits()
            | Self::PATH_UNLINK_FILE.bits();

        /// Bits that only make sense on a file FD.
        const FILE_ONLY = Self::FD_DATASYNC.bits()
            | Self::FD_READ.bits()
            | Self::FD_SEEK.bits()
            | Self::FD_SYNC.bits()
            | Self::FD_TELL.bits()
            | Self::FD_WRITE.bits()
            | Self::FD_ADVISE.bits()
            | Self::FD_ALLOCATE.bits()
            | Self::FD_FILESTAT_GET.bits()
            | Self::FD_FILESTAT_SET_SIZE.bits()
            | Self::FD_FILESTAT_SET_TIMES.bits();
    }
}

/// What kind of child is being opened, used to strip the opposite kind's bits per the
/// inheritance rule in §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    File,
    Directory,
}

impl Rights {
    /// Computes a child FD's `rights_base`/`rights_inheriting` pair from its parent directory's
    /// `rights_inheriting`, the caller's `requested` rights, and the kind of entry being opened.
    ///
    /// Per §3: `child.rights_base = (parent.rights_inheriting & requested) & ~opposite_kind_only_bits`,
    /// and `rights_inheriting` is filtered the same way.
    #[must_use]
    pub fn inherit(parent_inheriting: Rights, requested: Rights, kind: ChildKind) -> (Rights, Rights) {
        let opposite_only = match kind {
            ChildKind::File => Rights::DIRECTORY_ONLY,
            ChildKind::Directory => Rights::empty(),
        };
        let filtered = (parent_inheriting & requested) & !opposite_only;
        (filtered, filtered)
    }

    #[must_use]
    pub fn allows(self, required: Rights) -> bool {
        self.contains(required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_children_lose_directory_only_bits() {
        let parent_inheriting = Rights::FD_READ | Rights::PATH_OPEN | Rights::FD_WRITE;
        let requested = parent_inheriting;
        let (base, inheriting) = Rights::inherit(parent_inheriting, requested, ChildKind::File);
        assert!(!base.contains(Rights::PATH_OPEN));
        assert!(base.contains(Rights::FD_READ));
        assert!(base.contains(Rights::FD_WRITE));
        assert_eq!(base, inheriting);
    }

    #[test]
    fn child_rights_are_a_subset_of_requested_and_parent() {
        let parent_inheriting = Rights::FD_READ;
        let requested = Rights::FD_READ | Rights::FD_WRITE;
        let (base, _) = Rights::inherit(parent_inheriting, requested, ChildKind::File);
        assert!(parent_inheriting.contains(base));
        assert!(requested.contains(base));
    }

    #[test]
    fn directory_children_keep_directory_only_bits() {
        let parent_inheriting = Rights::PATH_OPEN | Rights::FD_READDIR;
        let (base, _) = Rights::inherit(parent_inheriting, parent_inheriting, ChildKind::Directory);
        assert_eq!(base, parent_inheriting);
    }
}
