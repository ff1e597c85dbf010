//! Backup format versions
//!
//! The on-store layout of drive data changed several times. Restore needs the
//! version a backup was written with to know where directory metadata lives.

/// Original layout: `.data` only, no directory metadata
pub const ONE_DRIVE_0_BASE: i32 = 0;
/// Files split into `.data` and `.meta`; directories get `<name>.dirmeta`
/// next to themselves in the parent
pub const ONE_DRIVE_1_DATA_AND_META_FILES: i32 = 1;
/// `.dirmeta` markers exist for every directory
pub const ONE_DRIVE_3_IS_META_MARKER: i32 = 3;
/// Directory metadata moved inside the directory as `<name>.dirmeta`
pub const ONE_DRIVE_4_DIR_INCLUDES_PERMISSIONS: i32 = 4;
/// Directory metadata inside the directory is named plain `.dirmeta`
pub const ONE_DRIVE_5_DIR_META_NO_NAME: i32 = 5;
/// File names live in the `.meta` entry instead of the storage name
pub const ONE_DRIVE_6_NAME_IN_META: i32 = 6;
/// Resource owners keyed by ID instead of principal name
pub const ALL_8_MIGRATE_USER_PN_TO_ID: i32 = 8;
/// Version written by this build
pub const BACKUP: i32 = 9;

/// Suffix of file content entries
pub const DATA_FILE_SUFFIX: &str = ".data";
/// Suffix of file metadata entries
pub const META_FILE_SUFFIX: &str = ".meta";
/// Suffix of directory metadata entries
pub const DIR_META_FILE_SUFFIX: &str = ".dirmeta";
