//! Flash controller boundary: write-once info pages holding the key manager
//! root seeds.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Size of each key manager seed in bytes.
pub const SEED_SIZE: usize = 32;

/// Flash info pages reserved for personalization secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InfoPage {
    CreatorSecret,
    OwnerSecret,
}

impl InfoPage {
    pub const ALL: [InfoPage; 2] = [InfoPage::CreatorSecret, InfoPage::OwnerSecret];

    pub const fn bank(self) -> u8 {
        0
    }

    pub const fn index(self) -> u8 {
        match self {
            InfoPage::CreatorSecret => 1,
            InfoPage::OwnerSecret => 2,
        }
    }
}

impl fmt::Display for InfoPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(bank {}, page {})", self, self.bank(), self.index())
    }
}

/// Flash controller failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlashError {
    #[error("info page {0} already programmed")]
    PageAlreadyProgrammed(InfoPage),

    #[error("info page {page} expects {expected} bytes, got {actual}")]
    LengthMismatch {
        page: InfoPage,
        expected: usize,
        actual: usize,
    },

    #[error("flash controller fault: {0}")]
    Controller(String),
}

/// Flash controller operations used during personalization.
pub trait FlashController {
    /// Program `data` into an info page. Each page accepts exactly one write.
    fn write_info_page(&mut self, page: InfoPage, data: &[u8]) -> Result<(), FlashError>;

    /// Whether the page already holds programmed content.
    fn is_info_page_programmed(&self, page: InfoPage) -> Result<bool, FlashError>;
}
