//! Content blocks: the typed, ordered fragments of a proposal body.
//!
//! Payload shapes are loose JSON, but each block type has a minimal shape
//! that is checked by [`validate_block`]. Sibling `order` values are kept
//! contiguous (`0..n`) by every mutation in this module.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{new_id, EntityId};

/// Maximum number of blocks in a single proposal.
pub const MAX_BLOCKS: usize = 500;

/// Maximum length of a single text payload.
pub const MAX_BLOCK_TEXT_LENGTH: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Text,
    Heading,
    Subheading,
    List,
    Checklist,
    Image,
    Video,
    Link,
    Code,
    Quote,
    Divider,
}

impl BlockType {
    pub const ALL: [BlockType; 11] = [
        BlockType::Text,
        BlockType::Heading,
        BlockType::Subheading,
        BlockType::List,
        BlockType::Checklist,
        BlockType::Image,
        BlockType::Video,
        BlockType::Link,
        BlockType::Code,
        BlockType::Quote,
        BlockType::Divider,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Text => "text",
            BlockType::Heading => "heading",
            BlockType::Subheading => "subheading",
            BlockType::List => "list",
            BlockType::Checklist => "checklist",
            BlockType::Image => "image",
            BlockType::Video => "video",
            BlockType::Link => "link",
            BlockType::Code => "code",
            BlockType::Quote => "quote",
            BlockType::Divider => "divider",
        }
    }

    fn is_media(self) -> bool {
        matches!(self, BlockType::Image | BlockType::Video | BlockType::Link)
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlockType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown block type '{s}'")))
    }
}

/// A single block owned by a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub id: EntityId,
    pub order: u32,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
}

/// Input for a block that does not exist yet.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBlock {
    #[serde(rename = "type")]
    pub block_type: BlockType,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl ContentBlock {
    /// Build a block from input at the given position.
    pub fn from_new(input: NewBlock, order: u32) -> Self {
        Self {
            id: new_id(),
            order,
            block_type: input.block_type,
            content: input.content,
            metadata: input.metadata.unwrap_or_else(empty_object),
        }
    }

    /// The block's plain text, if its payload carries any.
    ///
    /// Accepts a bare JSON string or an object with a string `text` field.
    pub fn plain_text(&self) -> Option<&str> {
        match &self.content {
            serde_json::Value::String(s) => Some(s.as_str()),
            serde_json::Value::Object(map) => map.get("text").and_then(|t| t.as_str()),
            _ => None,
        }
    }

    /// Trimmed, non-empty text of the block.
    pub fn non_empty_text(&self) -> Option<&str> {
        self.plain_text().map(str::trim).filter(|t| !t.is_empty())
    }

    fn media_url(&self) -> Option<&str> {
        match &self.content {
            serde_json::Value::String(s) => Some(s.as_str()),
            serde_json::Value::Object(map) => map.get("url").and_then(|u| u.as_str()),
            _ => None,
        }
    }
}

/// Check that a block's payload matches the minimal shape for its type.
pub fn validate_block(block: &ContentBlock) -> Result<(), CoreError> {
    if !block.metadata.is_object() {
        return Err(CoreError::Validation(format!(
            "Block {} metadata must be a JSON object",
            block.id
        )));
    }

    match block.block_type {
        BlockType::List | BlockType::Checklist => {
            if !(block.content.is_array() || block.content.is_null()) {
                return Err(CoreError::Validation(format!(
                    "{} block content must be an array of items",
                    block.block_type
                )));
            }
        }
        t if t.is_media() => {
            let has_url = block.media_url().is_some_and(|u| !u.trim().is_empty());
            if !has_url {
                return Err(CoreError::Validation(format!(
                    "{t} block requires a non-empty url"
                )));
            }
        }
        BlockType::Divider => {
            if !block.content.is_null() && block.non_empty_text().is_some() {
                return Err(CoreError::Validation(
                    "divider block must not carry text".to_string(),
                ));
            }
        }
        _ => {
            let text_shaped = block.content.is_null() || block.plain_text().is_some();
            if !text_shaped {
                return Err(CoreError::Validation(format!(
                    "{} block content must be text or an object with a `text` field",
                    block.block_type
                )));
            }
        }
    }

    if let Some(text) = block.plain_text() {
        if text.chars().count() > MAX_BLOCK_TEXT_LENGTH {
            return Err(CoreError::Validation(format!(
                "Block text exceeds maximum length of {MAX_BLOCK_TEXT_LENGTH} characters"
            )));
        }
    }

    Ok(())
}

/// Validate a whole block list: count, per-block shape, unique ids.
pub fn validate_blocks(blocks: &[ContentBlock]) -> Result<(), CoreError> {
    if blocks.len() > MAX_BLOCKS {
        return Err(CoreError::Validation(format!(
            "A proposal may contain at most {MAX_BLOCKS} blocks"
        )));
    }
    let mut seen = HashSet::with_capacity(blocks.len());
    for block in blocks {
        if !seen.insert(block.id) {
            return Err(CoreError::Validation(format!(
                "Duplicate block id {}",
                block.id
            )));
        }
        validate_block(block)?;
    }
    Ok(())
}

/// Turn block inputs into owned blocks with contiguous order.
pub fn build_blocks(inputs: Vec<NewBlock>) -> Vec<ContentBlock> {
    inputs
        .into_iter()
        .enumerate()
        .map(|(i, input)| ContentBlock::from_new(input, i as u32))
        .collect()
}

/// Sort by `order` and rewrite positions to `0..n`.
pub fn normalize_order(blocks: &mut [ContentBlock]) {
    blocks.sort_by_key(|b| b.order);
    for (i, block) in blocks.iter_mut().enumerate() {
        block.order = i as u32;
    }
}

/// Append a validated block at the end and return its id.
pub fn append_block(blocks: &mut Vec<ContentBlock>, input: NewBlock) -> Result<EntityId, CoreError> {
    if blocks.len() >= MAX_BLOCKS {
        return Err(CoreError::Validation(format!(
            "A proposal may contain at most {MAX_BLOCKS} blocks"
        )));
    }
    let block = ContentBlock::from_new(input, blocks.len() as u32);
    validate_block(&block)?;
    let id = block.id;
    blocks.push(block);
    normalize_order(blocks);
    Ok(id)
}

/// Remove a block by id and close the gap in `order`.
pub fn remove_block(blocks: &mut Vec<ContentBlock>, block_id: EntityId) -> Result<(), CoreError> {
    let index = blocks
        .iter()
        .position(|b| b.id == block_id)
        .ok_or(CoreError::NotFound {
            entity: "ContentBlock",
            id: block_id,
        })?;
    blocks.remove(index);
    normalize_order(blocks);
    Ok(())
}

/// Reorder blocks to match `ordered_ids`, which must be a permutation of
/// the current ids.
pub fn reorder_blocks(
    blocks: &mut [ContentBlock],
    ordered_ids: &[EntityId],
) -> Result<(), CoreError> {
    if ordered_ids.len() != blocks.len() {
        return Err(CoreError::Validation(format!(
            "Reorder must list all {} blocks (got {})",
            blocks.len(),
            ordered_ids.len()
        )));
    }
    let unique: HashSet<_> = ordered_ids.iter().collect();
    if unique.len() != ordered_ids.len() {
        return Err(CoreError::Validation(
            "Reorder contains duplicate block ids".to_string(),
        ));
    }
    for block in blocks.iter_mut() {
        let position = ordered_ids
            .iter()
            .position(|id| *id == block.id)
            .ok_or_else(|| {
                CoreError::Validation(format!("Block {} missing from reorder", block.id))
            })?;
        block.order = position as u32;
    }
    normalize_order(blocks);
    Ok(())
}

/// First non-empty heading text and first non-empty subheading text.
pub fn extract_title_and_description(blocks: &[ContentBlock]) -> (Option<&str>, Option<&str>) {
    let mut sorted: Vec<&ContentBlock> = blocks.iter().collect();
    sorted.sort_by_key(|b| b.order);

    (
        first_text_of(&sorted, BlockType::Heading),
        first_text_of(&sorted, BlockType::Subheading),
    )
}

fn first_text_of<'a>(sorted: &[&'a ContentBlock], kind: BlockType) -> Option<&'a str> {
    sorted
        .iter()
        .copied()
        .filter(|b| b.block_type == kind)
        .find_map(ContentBlock::non_empty_text)
}
