use crate::channel::ReleaseRecord;
use crate::page::Page;
use std::fmt;

const BUILD_NUMBER_CLASS: &str = "build_number";
const VERSION_HASH_CLASS: &str = "version_hash";

#[derive(Debug, PartialEq, Eq)]
pub enum RenderError {
    /// No element on the page carries the record's channel id.
    UnknownChannel(String),
    /// The channel element exists but lacks one of the expected slots.
    MissingSlot {
        channel: String,
        class: &'static str,
    },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::UnknownChannel(channel) => {
                write!(f, "no element with id `{channel}` on this page")
            }
            RenderError::MissingSlot { channel, class } => {
                write!(f, "element `{channel}` has no `.{class}` descendant")
            }
        }
    }
}

/// Write one record's build number and version hash into the subtree whose
/// id matches the record's channel. Touches nothing outside that subtree;
/// rendering the same record again is a no-op in terms of final state.
pub fn render_record<P: Page>(page: &P, record: &ReleaseRecord) -> Result<(), RenderError> {
    let root = page
        .find_by_id(&record.release_channel)
        .ok_or_else(|| RenderError::UnknownChannel(record.release_channel.clone()))?;

    let build_slot = page
        .find_first_by_class(&root, BUILD_NUMBER_CLASS)
        .ok_or(RenderError::MissingSlot {
            channel: record.release_channel.clone(),
            class: BUILD_NUMBER_CLASS,
        })?;
    let hash_slot = page
        .find_first_by_class(&root, VERSION_HASH_CLASS)
        .ok_or(RenderError::MissingSlot {
            channel: record.release_channel.clone(),
            class: VERSION_HASH_CLASS,
        })?;

    page.set_text(&build_slot, &record.build_number);
    page.set_text(&hash_slot, &record.version_hash);
    Ok(())
}
