//! Canonical, tenant-scoped paths
//!
//! Every collection produced by a backup is addressed by a canonical path:
//!
//! ```text
//! tenant/service/owner/category/folder/.../[item]
//! ```
//!
//! Elements are stored unescaped in memory. When rendered, a `/` or `\`
//! inside an element is prefixed with `\` so the string form can be split
//! back into the same elements. The string form is what gets persisted as a
//! "previous path" and read back on the next run.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::errors::DomainError;

const ESCAPE_CHARACTER: char = '\\';
const PATH_SEPARATOR: char = '/';
const SHORT_REF_CHARACTERS: usize = 12;

/// Number of elements in the `tenant/service/owner/category` prefix.
const PREFIX_LEN: usize = 4;

/// Marker element that follows the drive ID in drive-backed paths.
pub const DRIVE_ROOT_MARKER: &str = "root:";
/// Element that precedes the drive ID in drive-backed paths.
pub const DRIVES_ELEMENT: &str = "drives";

fn needs_escape(c: char) -> bool {
    c == PATH_SEPARATOR || c == ESCAPE_CHARACTER
}

// ============================================================================
// Service and category
// ============================================================================

/// The remote service a path belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    Exchange,
    OneDrive,
    SharePoint,
    Groups,
    ExchangeMetadata,
    OneDriveMetadata,
    SharePointMetadata,
    GroupsMetadata,
}

impl Service {
    /// Returns the metadata twin of a data service.
    ///
    /// Metadata services map to themselves.
    #[must_use]
    pub fn metadata(self) -> Self {
        match self {
            Self::Exchange | Self::ExchangeMetadata => Self::ExchangeMetadata,
            Self::OneDrive | Self::OneDriveMetadata => Self::OneDriveMetadata,
            Self::SharePoint | Self::SharePointMetadata => Self::SharePointMetadata,
            Self::Groups | Self::GroupsMetadata => Self::GroupsMetadata,
        }
    }

    /// Returns the data service a metadata service describes.
    #[must_use]
    pub fn data(self) -> Self {
        match self {
            Self::Exchange | Self::ExchangeMetadata => Self::Exchange,
            Self::OneDrive | Self::OneDriveMetadata => Self::OneDrive,
            Self::SharePoint | Self::SharePointMetadata => Self::SharePoint,
            Self::Groups | Self::GroupsMetadata => Self::Groups,
        }
    }

    /// Returns true for the `*Metadata` services.
    #[must_use]
    pub fn is_metadata(self) -> bool {
        self != self.data()
    }

    /// Returns the canonical string form used inside paths
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exchange => "exchange",
            Self::OneDrive => "onedrive",
            Self::SharePoint => "sharepoint",
            Self::Groups => "groups",
            Self::ExchangeMetadata => "exchangeMetadata",
            Self::OneDriveMetadata => "onedriveMetadata",
            Self::SharePointMetadata => "sharepointMetadata",
            Self::GroupsMetadata => "groupsMetadata",
        }
    }
}

impl Display for Service {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Service {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exchange" => Ok(Self::Exchange),
            "onedrive" => Ok(Self::OneDrive),
            "sharepoint" => Ok(Self::SharePoint),
            "groups" => Ok(Self::Groups),
            "exchangemetadata" => Ok(Self::ExchangeMetadata),
            "onedrivemetadata" => Ok(Self::OneDriveMetadata),
            "sharepointmetadata" => Ok(Self::SharePointMetadata),
            "groupsmetadata" => Ok(Self::GroupsMetadata),
            _ => Err(DomainError::InvalidServiceCategory(format!(
                "unknown service: {s}"
            ))),
        }
    }
}

/// The category of data a path holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Email,
    Contacts,
    Events,
    Files,
    Libraries,
    ChannelMessages,
    Conversations,
}

impl Category {
    /// Returns the canonical string form used inside paths
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Contacts => "contacts",
            Self::Events => "events",
            Self::Files => "files",
            Self::Libraries => "libraries",
            Self::ChannelMessages => "channelMessages",
            Self::Conversations => "conversations",
        }
    }

    /// The data service that owns this category.
    ///
    /// `Libraries` is shared by SharePoint sites and group sites; it reports
    /// SharePoint here and [`validate_service_category`] accepts both.
    #[must_use]
    pub fn service(&self) -> Service {
        match self {
            Self::Email | Self::Contacts | Self::Events => Service::Exchange,
            Self::Files => Service::OneDrive,
            Self::Libraries => Service::SharePoint,
            Self::ChannelMessages | Self::Conversations => Service::Groups,
        }
    }

    /// Returns true for categories whose collections live inside drives.
    #[must_use]
    pub fn is_drive_backed(&self) -> bool {
        matches!(self, Self::Files | Self::Libraries)
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "contacts" => Ok(Self::Contacts),
            "events" => Ok(Self::Events),
            "files" => Ok(Self::Files),
            "libraries" => Ok(Self::Libraries),
            "channelmessages" | "channel_messages" => Ok(Self::ChannelMessages),
            "conversations" => Ok(Self::Conversations),
            _ => Err(DomainError::InvalidServiceCategory(format!(
                "unknown category: {s}"
            ))),
        }
    }
}

/// Checks that `category` is valid for `service` (or its metadata twin).
pub fn validate_service_category(service: Service, category: Category) -> Result<(), DomainError> {
    let ok = match service.data() {
        Service::Exchange => matches!(
            category,
            Category::Email | Category::Contacts | Category::Events
        ),
        Service::OneDrive => category == Category::Files,
        Service::SharePoint => category == Category::Libraries,
        Service::Groups => matches!(
            category,
            Category::Libraries | Category::ChannelMessages | Category::Conversations
        ),
        _ => false,
    };

    if ok {
        Ok(())
    } else {
        Err(DomainError::InvalidServiceCategory(format!(
            "{service}/{category}"
        )))
    }
}

// ============================================================================
// Escaping
// ============================================================================

/// Escapes `/` and `\` inside a single element.
pub fn escape_element(element: &str) -> String {
    if !element.chars().any(needs_escape) {
        return element.to_string();
    }

    let mut out = String::with_capacity(element.len() + 4);
    for c in element.chars() {
        if needs_escape(c) {
            out.push(ESCAPE_CHARACTER);
        }
        out.push(c);
    }
    out
}

/// Removes escape characters from an element previously validated with
/// [`validate_escaped_element`].
fn unescape(element: &str) -> String {
    let mut out = String::with_capacity(element.len());
    let mut prev_was_escape = false;

    for c in element.chars() {
        if c == ESCAPE_CHARACTER && !prev_was_escape {
            prev_was_escape = true;
            continue;
        }
        prev_was_escape = false;
        out.push(c);
    }
    out
}

/// Ensures every escape character precedes a character that needs escaping,
/// and that no character needing escape appears bare.
fn validate_escaped_element(element: &str) -> Result<(), DomainError> {
    let mut prev_was_escape = false;

    for c in element.chars() {
        if prev_was_escape {
            prev_was_escape = false;
            if !needs_escape(c) {
                return Err(DomainError::InvalidPath(format!(
                    "bad escape sequence in path: '{ESCAPE_CHARACTER}{c}'"
                )));
            }
            continue;
        }

        if c == ESCAPE_CHARACTER {
            prev_was_escape = true;
            continue;
        }

        if needs_escape(c) {
            return Err(DomainError::InvalidPath(format!(
                "unescaped character in path: '{c}'"
            )));
        }
    }

    if prev_was_escape {
        return Err(DomainError::InvalidPath(
            "trailing escape character".to_string(),
        ));
    }

    Ok(())
}

/// Trims unescaped trailing separators from an escaped string.
pub fn trim_trailing_slash(s: &str) -> &str {
    let mut s = s;
    while let Some(stripped) = s.strip_suffix(PATH_SEPARATOR) {
        let escapes = stripped
            .chars()
            .rev()
            .take_while(|c| *c == ESCAPE_CHARACTER)
            .count();
        if escapes % 2 != 0 {
            break;
        }
        s = stripped;
    }
    s
}

/// Splits an escaped string on unescaped separators.
///
/// Leading and repeated separators never produce empty elements. Elements
/// are returned still escaped.
pub fn split(s: &str) -> Vec<String> {
    let mut res = Vec::new();
    let mut current = String::new();
    let mut escapes = 0usize;

    for c in s.chars() {
        if c == PATH_SEPARATOR && escapes % 2 == 0 {
            if !current.is_empty() {
                res.push(std::mem::take(&mut current));
            }
            escapes = 0;
            continue;
        }

        if c == ESCAPE_CHARACTER {
            escapes += 1;
        } else {
            escapes = 0;
        }
        current.push(c);
    }

    if !current.is_empty() {
        res.push(current);
    }

    res
}

// ============================================================================
// PathBuilder
// ============================================================================

/// An ordered list of unescaped path elements with no prefix requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathBuilder {
    elements: Vec<String>,
}

impl PathBuilder {
    /// Creates an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder from unescaped elements, dropping empty ones.
    pub fn from_elements<I, S>(elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new().append_all(elements)
    }

    /// Parses an escaped string into a builder.
    pub fn from_escaped(s: &str) -> Result<Self, DomainError> {
        Self::new().unescape_and_append(split(trim_trailing_slash(s)))
    }

    /// Returns a new builder with `element` appended (unescaped input).
    #[must_use]
    pub fn append(&self, element: impl Into<String>) -> Self {
        self.clone().append_all([element])
    }

    /// Returns a new builder with all `elements` appended (unescaped input).
    #[must_use]
    pub fn append_all<I, S>(mut self, elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.elements.extend(
            elements
                .into_iter()
                .map(Into::into)
                .filter(|e| !e.is_empty()),
        );
        self
    }

    /// Returns a new builder with escaped `elements` unescaped and appended.
    pub fn unescape_and_append<I, S>(&self, elements: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut res = self.clone();
        for e in elements {
            let trimmed = trim_trailing_slash(e.as_ref());
            if trimmed.is_empty() {
                continue;
            }
            validate_escaped_element(trimmed)?;
            res.elements.push(unescape(trimmed));
        }
        Ok(res)
    }

    /// Drops the last element. An empty or single-element builder becomes empty.
    #[must_use]
    pub fn dir(&self) -> Self {
        let mut elements = self.elements.clone();
        elements.pop();
        Self { elements }
    }

    /// Drops the first element.
    #[must_use]
    pub fn pop_front(&self) -> Self {
        Self {
            elements: self.elements.iter().skip(1).cloned().collect(),
        }
    }

    /// Returns the last element, if any
    #[must_use]
    pub fn last_elem(&self) -> Option<&str> {
        self.elements.last().map(String::as_str)
    }

    /// Returns a copy of the unescaped elements
    #[must_use]
    pub fn elements(&self) -> Vec<String> {
        self.elements.clone()
    }

    /// Borrow the unescaped elements
    #[must_use]
    pub fn as_elements(&self) -> &[String] {
        &self.elements
    }

    /// Number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when there are no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// First 12 hex characters of the SHA-256 of the concatenated elements.
    ///
    /// Empty builders have an empty short ref.
    #[must_use]
    pub fn short_ref(&self) -> String {
        if self.elements.is_empty() {
            return String::new();
        }

        let mut hasher = Sha256::new();
        for e in &self.elements {
            hasher.update(e.as_bytes());
        }
        let digest = hasher.finalize();

        digest
            .iter()
            .take(SHORT_REF_CHARACTERS / 2)
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    fn with_prefix(&self, prefix: [&str; PREFIX_LEN]) -> Self {
        let mut elements: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        elements.extend(self.elements.iter().cloned());
        Self { elements }
    }

    /// Builds a data-layer path `tenant/service/owner/category/<self>`.
    ///
    /// The builder must hold at least one element.
    pub fn to_data_layer_path(
        &self,
        tenant: &str,
        owner: &str,
        service: Service,
        category: Category,
        is_item: bool,
    ) -> Result<CanonicalPath, DomainError> {
        validate_service_category(service, category)?;
        verify_prefix_values(tenant, owner)?;

        if self.elements.is_empty() {
            return Err(DomainError::InvalidPath(
                "missing path beyond prefix".to_string(),
            ));
        }

        Ok(CanonicalPath {
            builder: self.with_prefix([tenant, service.as_str(), owner, category.as_str()]),
            service,
            category,
            has_item: is_item,
        })
    }

    /// Builds a metadata path `tenant/<service>Metadata/owner/category/<self>`.
    ///
    /// Unlike data paths the builder may be empty, which yields the metadata
    /// prefix for a category.
    pub fn to_service_category_metadata_path(
        &self,
        tenant: &str,
        owner: &str,
        service: Service,
        category: Category,
        is_item: bool,
    ) -> Result<CanonicalPath, DomainError> {
        validate_service_category(service, category)?;
        verify_prefix_values(tenant, owner)?;

        if is_item && self.elements.is_empty() {
            return Err(DomainError::InvalidPath(
                "missing path beyond prefix".to_string(),
            ));
        }

        let service = service.metadata();

        Ok(CanonicalPath {
            builder: self.with_prefix([tenant, service.as_str(), owner, category.as_str()]),
            service,
            category,
            has_item: is_item,
        })
    }
}

impl Display for PathBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let escaped: Vec<String> = self.elements.iter().map(|e| escape_element(e)).collect();
        write!(f, "{}", escaped.join("/"))
    }
}

fn verify_prefix_values(tenant: &str, owner: &str) -> Result<(), DomainError> {
    if tenant.is_empty() {
        return Err(DomainError::InvalidPath(
            "missing required path element: tenant".to_string(),
        ));
    }
    if owner.is_empty() {
        return Err(DomainError::InvalidPath(
            "missing required path element: resource owner".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// CanonicalPath
// ============================================================================

/// A validated `tenant/service/owner/category/...` path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalPath {
    builder: PathBuilder,
    service: Service,
    category: Category,
    has_item: bool,
}

impl CanonicalPath {
    /// Parses a persisted path string.
    ///
    /// Requires at least five elements (the four prefix elements plus one
    /// folder or item) and a valid service/category pair.
    pub fn from_data_layer_path(s: &str, is_item: bool) -> Result<Self, DomainError> {
        let trimmed = trim_trailing_slash(s);
        if trimmed.is_empty() {
            return Err(DomainError::InvalidPath(
                "logically empty path given".to_string(),
            ));
        }

        let builder = PathBuilder::new().unescape_and_append(split(trimmed))?;
        if builder.len() <= PREFIX_LEN {
            return Err(DomainError::InvalidPath(format!(
                "path has too few segments: {s}"
            )));
        }

        let service: Service = builder.elements[1].parse()?;
        let category: Category = builder.elements[3].parse()?;
        validate_service_category(service, category)?;

        Ok(Self {
            builder,
            service,
            category,
            has_item: is_item,
        })
    }

    /// Tenant element
    #[must_use]
    pub fn tenant(&self) -> &str {
        &self.builder.elements[0]
    }

    /// Service of this path
    #[must_use]
    pub fn service(&self) -> Service {
        self.service
    }

    /// Resource owner element (user, group, site)
    #[must_use]
    pub fn resource_owner(&self) -> &str {
        &self.builder.elements[2]
    }

    /// Category of this path
    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    /// Folder elements after the prefix, excluding the item if there is one.
    #[must_use]
    pub fn folders(&self) -> Vec<String> {
        let end = if self.has_item {
            self.builder.len().saturating_sub(1)
        } else {
            self.builder.len()
        };
        self.builder.elements[PREFIX_LEN.min(end)..end].to_vec()
    }

    /// Folder portion rendered as a string, optionally escaped.
    #[must_use]
    pub fn folder(&self, escape: bool) -> String {
        let folders = self.folders();
        if escape {
            PathBuilder::from_elements(folders).to_string()
        } else {
            folders.join("/")
        }
    }

    /// Item element, when this path addresses an item.
    #[must_use]
    pub fn item(&self) -> Option<&str> {
        if self.has_item {
            self.builder.last_elem()
        } else {
            None
        }
    }

    /// All unescaped elements
    #[must_use]
    pub fn elements(&self) -> Vec<String> {
        self.builder.elements()
    }

    /// Builder holding the full element list
    #[must_use]
    pub fn to_builder(&self) -> PathBuilder {
        self.builder.clone()
    }

    /// Builder holding only the folder elements after the prefix
    #[must_use]
    pub fn folder_builder(&self) -> PathBuilder {
        PathBuilder::from_elements(self.folders())
    }

    /// Short, stable reference used as a collection key
    #[must_use]
    pub fn short_ref(&self) -> String {
        self.builder.short_ref()
    }

    /// Returns the parent folder path.
    ///
    /// Fails when the result would drop into the prefix.
    pub fn dir(&self) -> Result<Self, DomainError> {
        if self.builder.len() <= PREFIX_LEN {
            return Err(DomainError::InvalidPath(
                "unable to shorten path".to_string(),
            ));
        }

        Ok(Self {
            builder: self.builder.dir(),
            service: self.service,
            category: self.category,
            has_item: false,
        })
    }

    /// Appends an element. Items cannot have children.
    pub fn append(&self, element: &str, is_item: bool) -> Result<Self, DomainError> {
        if self.has_item {
            return Err(DomainError::InvalidPath(
                "adding element to an item path".to_string(),
            ));
        }

        Ok(Self {
            builder: self.builder.append(element),
            service: self.service,
            category: self.category,
            has_item: is_item,
        })
    }
}

impl Display for CanonicalPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.builder)
    }
}

// ============================================================================
// Drive paths
// ============================================================================

/// Decomposition of a drive-backed folder path:
/// `.../drives/<driveID>/root:/folder/...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrivePath {
    /// Drive the folder lives in
    pub drive_id: String,
    /// Root marker element (always `root:`)
    pub root: String,
    /// Folder elements below the drive root
    pub folders: PathBuilder,
}

impl DrivePath {
    /// Extracts the drive layout from a canonical folder path.
    pub fn from_path(p: &CanonicalPath) -> Result<Self, DomainError> {
        let folders = p.folders();
        if folders.len() < 3 || folders[0] != DRIVES_ELEMENT || folders[2] != DRIVE_ROOT_MARKER {
            return Err(DomainError::InvalidPath(format!(
                "not a drive path: expected {DRIVES_ELEMENT}/<driveID>/{DRIVE_ROOT_MARKER}, got {}",
                p.folder(false)
            )));
        }

        Ok(Self {
            drive_id: folders[1].clone(),
            root: folders[2].clone(),
            folders: PathBuilder::from_elements(folders.into_iter().skip(3)),
        })
    }

    /// Builder of the drive prefix `drives/<driveID>/root:`
    #[must_use]
    pub fn prefix(drive_id: &str) -> PathBuilder {
        PathBuilder::from_elements([DRIVES_ELEMENT, drive_id, DRIVE_ROOT_MARKER])
    }
}
