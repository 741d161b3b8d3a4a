//! In-place compaction of the enumeration buffer.
//!
//! Records flagged by the hide predicate are removed by shifting every
//! byte after them backward over their slot in a single contiguous move,
//! shrinking the valid region. Kept records are untouched, so the caller
//! sees the exact bytes the original call produced, minus whole records.

use crate::{dirent, predicate::HideEngine};

/// Filter the first `reported` bytes of `buf` in place and return the
/// corrected length. `dir` is the resolved path of the enumerated
/// directory (`None` when resolution failed, the predicate's fail mode
/// then applies).
///
/// A malformed record stops the walk: the remaining bytes are left as the
/// original call produced them, since guessing at record boundaries could
/// tear a record in half. The corrected length still covers them.
pub fn filter_entries(
    buf: &mut [u8],
    reported: usize,
    dir: Option<&str>,
    engine: &HideEngine,
) -> usize {
    let mut valid = reported.min(buf.len());
    let mut cursor = 0;

    while cursor < valid {
        let (reclen, hide) = match dirent::parse(&buf[..valid], cursor) {
            Ok(entry) => {
                let name = String::from_utf8_lossy(entry.name);
                (entry.reclen as usize, engine.must_hide(dir, &name))
            }
            Err(err) => {
                log::warn!("stopping enumeration filter early: {err}");
                break;
            }
        };

        if hide {
            // Single contiguous move of the remaining suffix; for the
            // last record this is a zero-length copy and a truncation.
            buf.copy_within(cursor + reclen..valid, cursor);
            valid -= reclen;
            // The next record moved into the cursor slot; do not advance.
        } else {
            cursor += reclen;
        }
    }

    valid
}
