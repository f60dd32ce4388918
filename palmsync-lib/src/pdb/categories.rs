//! The standard category table at the front of an AppInfo block.

use bytes::{BufMut, BytesMut};

use crate::error::{Result, SyncError};
use crate::wire::{put_padded_string, Reader};

pub const MAX_CATEGORIES: usize = 16;
const CATEGORY_NAME_WIDTH: usize = 16;

/// The fixed size of an encoded category table.
pub const CATEGORY_TABLE_LEN: usize = 2 + MAX_CATEGORIES * CATEGORY_NAME_WIDTH + MAX_CATEGORIES + 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub id: u8,
    pub renamed: bool,
}

/// The category table most record databases store at the start of their
/// AppInfo block: 16 name slots, per-slot ids, and a renamed bitmask.
/// Unused slots have empty names and are dropped on parse.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CategoryTable {
    pub categories: Vec<Category>,
    pub last_unique_id: u8,
}

impl CategoryTable {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let mut r = Reader::new(raw);
        let renamed = r.u16()?;
        let mut names = Vec::with_capacity(MAX_CATEGORIES);
        for _ in 0..MAX_CATEGORIES {
            names.push(r.padded_string(CATEGORY_NAME_WIDTH)?);
        }
        let mut categories = Vec::new();
        for (slot, name) in names.into_iter().enumerate() {
            let id = r.u8()?;
            if !name.is_empty() {
                categories.push(Category {
                    name,
                    id,
                    renamed: renamed & (1 << slot) != 0,
                });
            }
        }
        let last_unique_id = r.u8()?;
        r.skip(1)?;
        Ok(CategoryTable { categories, last_unique_id })
    }

    pub fn emit(&self) -> Result<Vec<u8>> {
        if self.categories.len() > MAX_CATEGORIES {
            return Err(SyncError::Validation(format!(
                "{} categories exceed the {MAX_CATEGORIES}-slot table",
                self.categories.len()
            )));
        }
        let mut buf = BytesMut::with_capacity(CATEGORY_TABLE_LEN);
        let mut renamed = 0u16;
        for (slot, category) in self.categories.iter().enumerate() {
            if category.renamed {
                renamed |= 1 << slot;
            }
        }
        buf.put_u16(renamed);
        for slot in 0..MAX_CATEGORIES {
            match self.categories.get(slot) {
                Some(category) => put_padded_string(&mut buf, &category.name, CATEGORY_NAME_WIDTH)?,
                None => buf.put_bytes(0, CATEGORY_NAME_WIDTH),
            }
        }
        for slot in 0..MAX_CATEGORIES {
            buf.put_u8(self.categories.get(slot).map_or(0, |c| c.id));
        }
        buf.put_u8(self.last_unique_id);
        buf.put_u8(0);
        Ok(buf.to_vec())
    }
}
