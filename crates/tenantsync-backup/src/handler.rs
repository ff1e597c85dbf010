//! Per-category backup handlers
//!
//! Each data category is served by one handler variant. The handler answers
//! the capability questions the reconciliation engine asks (delta support,
//! owning service) and decides how a container contributes to the storage
//! path.

use std::fmt::{self, Display, Formatter};

use tenantsync_core::domain::{Category, Container, DrivePath, Service};

/// Capability set for one data category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryHandler {
    /// Exchange mail folders
    Mail,
    /// Exchange contact folders
    Contacts,
    /// Exchange calendars
    Events,
    /// Team channels (groups/channelMessages)
    Channel,
    /// Group conversations, which have no delta endpoint
    Conversation,
    /// Drive-backed document libraries (OneDrive files, SharePoint libraries)
    Library(Category),
}

impl CategoryHandler {
    /// Selects the handler for a category
    #[must_use]
    pub fn for_category(category: Category) -> Self {
        match category {
            Category::Email => Self::Mail,
            Category::Contacts => Self::Contacts,
            Category::Events => Self::Events,
            Category::ChannelMessages => Self::Channel,
            Category::Conversations => Self::Conversation,
            Category::Files | Category::Libraries => Self::Library(category),
        }
    }

    #[must_use]
    pub fn category(&self) -> Category {
        match self {
            Self::Mail => Category::Email,
            Self::Contacts => Category::Contacts,
            Self::Events => Category::Events,
            Self::Channel => Category::ChannelMessages,
            Self::Conversation => Category::Conversations,
            Self::Library(category) => *category,
        }
    }

    #[must_use]
    pub fn service(&self) -> Service {
        self.category().service()
    }

    /// Whether the category has a delta endpoint at all
    #[must_use]
    pub fn supports_delta(&self) -> bool {
        !matches!(self, Self::Events | Self::Conversation)
    }

    /// Whether delta mode may be used for one container in this run
    #[must_use]
    pub fn use_delta(&self, container: &Container, delta_enabled: bool) -> bool {
        delta_enabled && self.supports_delta() && container.supports_delta
    }

    /// Storage path elements contributed by one container.
    ///
    /// Libraries store their top-level container (the drive) under the
    /// `drives/<id>/root:` prefix and nested folders by name. Every other
    /// category stores containers by ID.
    #[must_use]
    pub fn storage_elements(&self, container: &Container, is_root: bool) -> Vec<String> {
        match self {
            Self::Library(_) if is_root => DrivePath::prefix(container.id.as_str()).elements(),
            Self::Library(_) => vec![container.display_name.clone()],
            _ => vec![container.id.to_string()],
        }
    }
}

impl Display for CategoryHandler {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mail => "mail",
            Self::Contacts => "contacts",
            Self::Events => "events",
            Self::Channel => "channel",
            Self::Conversation => "conversation",
            Self::Library(_) => "library",
        };
        write!(f, "{s}")
    }
}
