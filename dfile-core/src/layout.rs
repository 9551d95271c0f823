//! Shared on-disk layout constants.
//!
//! These define the widths, sentinels and file names of the Dfile store and
//! index artifacts. The store and index writers, the router and the tests all
//! read them from here so the text layout cannot drift between them.

/// Version tag written into every store header and index header.
pub const VERSION_TAG: &str = "Dfile01";

/// Characters per store line, not counting the newline.
pub const BLOCK_LEN: usize = 79;

/// Width of the right-justified forward pointer at the end of each block.
pub const ADDR_WIDTH: usize = 8;

/// Payload characters carried by one block.
pub const PAYLOAD_WIDTH: usize = BLOCK_LEN - ADDR_WIDTH - 1;

/// Longest model name (in bytes) that still leaves room for the free-list
/// head on the store header line.
pub const MAX_MODEL_LEN: usize =
    PAYLOAD_WIDTH + ADDR_WIDTH - "Version={Dfile01} Model={}".len() - 1;

/// Free-list head meaning "nothing reclaimed, append only".
pub const FREE_LIST_EMPTY: i64 = 0;

/// Pointer value carried by the final block of a chain.
pub const CHAIN_END: i64 = -1;

/// Separates fields inside a record and replaces line breaks inside text.
pub const FIELD_DELIMITER: char = '\\';

pub const STORE_EXTENSION: &str = "dff";
pub const INDEX_EXTENSION: &str = "dfa";
pub const SCRATCH_INDEX_EXTENSION: &str = "dft";

/// File stem of the partition holding records whose routing key is a digit.
pub const NUMBERS_PARTITION: &str = "numbers";
/// File stem of the partition holding records whose routing key is neither a letter nor a digit.
pub const OTHER_PARTITION: &str = "other";

/// Block size of the source memo store.
pub const MEMO_BLOCK_SIZE: u64 = 512;
/// Memo blocks read per reference; longer memos are truncated.
pub const MEMO_MAX_BLOCKS: usize = 4;
pub const MEMO_MAX_BYTES: usize = MEMO_MAX_BLOCKS * MEMO_BLOCK_SIZE as usize + 1;
/// Terminates memo text in the source memo store.
pub const MEMO_END: u8 = 0x1A;

/// Memo field value meaning "no memo".
pub const NO_MEMO: u64 = 0;
