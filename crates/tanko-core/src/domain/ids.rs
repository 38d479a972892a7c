//! Identifiers and catalog records.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Raw numeric value.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(
    /// Identifier of a remote source (one catalog provider).
    SourceId
);
id_newtype!(
    /// Identifier of a manga in the local catalog.
    MangaId
);
id_newtype!(
    /// Identifier of a chapter in the local catalog.
    ///
    /// At most one download per chapter id exists in a queue.
    ChapterId
);

/// A manga as known by the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manga {
    pub id: MangaId,
    pub title: String,
}

impl Manga {
    pub fn new(id: impl Into<MangaId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// A chapter as known by the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub manga_id: MangaId,
    /// Source-relative or absolute URL the source resolves into a page list.
    pub url: String,
    /// Display name, also used for the chapter directory.
    pub name: String,
}

impl Chapter {
    pub fn new(
        id: impl Into<ChapterId>,
        manga_id: impl Into<MangaId>,
        url: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            manga_id: manga_id.into(),
            url: url.into(),
            name: name.into(),
        }
    }
}
