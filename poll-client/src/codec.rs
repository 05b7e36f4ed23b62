//! Poll contract messages and getter results.
//!
//! Message layouts (all integers big-endian, `Int` is a 257-bit signed
//! integer as Tact stores it):
//!
//! ```text
//! CreatePoll          op:u32 subject:^String options:(HashmapE 257 ^String)
//! Vote                op:u32 poll_id:Int option_index:Int
//! CreatePollWithFunds op:u32 subject:^String description:^String
//!                     option_count:u8 reward_per_vote:Coins
//!                     total_reward_fund:Coins duration:u32 gasless:Bool
//!                     reward_jetton:MsgAddress
//! SetOptionCount      op:u32 poll_id:Int count:Int
//! StoreOption         op:u32 poll_id:Int index:Int text:^String
//! InitializeContract  op:u32 query_id:u64
//! ```

use crate::error::PollError;
use crate::model::{validate_options, validate_subject, ContractType, PollRecord, MAX_OPTIONS};
use crate::stack::StackEntry;
use ton_ser::{
    deserialize_boc, serialize_boc, Address, Cell, CellBuilder, CellSlice, Deserialize,
    Dictionary, ReadError, Serialize, WriteError,
};

pub const OP_CREATE_POLL: u32 = 0x7e8b_1a21;
pub const OP_VOTE: u32 = 0x3c1d_5f0e;
pub const OP_CREATE_POLL_WITH_FUNDS: u32 = 0x5b2a_c7d4;
pub const OP_SET_OPTION_COUNT: u32 = 0x1e6f_9a03;
pub const OP_STORE_OPTION: u32 = 0x44c0_3b8f;
pub const OP_INITIALIZE_CONTRACT: u32 = 0x0a9e_62d7;

/// Width of the integer keys of the options dictionary.
pub const OPTION_KEY_BITS: usize = 257;
const INT_BITS: usize = 257;

/// Parameters of the complex contract's funded poll creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundedPoll {
    pub subject: String,
    pub description: String,
    pub option_count: u8,
    /// nanotons
    pub reward_per_vote: u128,
    /// nanotons
    pub total_reward_fund: u128,
    /// seconds, 0 for an open-ended poll
    pub duration: u32,
    pub gasless_enabled: bool,
    /// jetton wallet paying the rewards, TON when absent
    pub reward_jetton: Option<Address>,
}

/// Every message understood by the two poll contracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollMessage {
    CreatePoll {
        subject: String,
        options: Vec<String>,
    },
    Vote {
        poll_id: u64,
        option_index: u32,
    },
    CreatePollWithFunds(FundedPoll),
    SetOptionCount {
        poll_id: u64,
        count: u32,
    },
    StoreOption {
        poll_id: u64,
        index: u32,
        text: String,
    },
    InitializeContract {
        query_id: u64,
    },
}

impl PollMessage {
    pub fn opcode(&self) -> u32 {
        match self {
            PollMessage::CreatePoll { .. } => OP_CREATE_POLL,
            PollMessage::Vote { .. } => OP_VOTE,
            PollMessage::CreatePollWithFunds(_) => OP_CREATE_POLL_WITH_FUNDS,
            PollMessage::SetOptionCount { .. } => OP_SET_OPTION_COUNT,
            PollMessage::StoreOption { .. } => OP_STORE_OPTION,
            PollMessage::InitializeContract { .. } => OP_INITIALIZE_CONTRACT,
        }
    }
}

fn string_cell(s: &str) -> Result<Cell, WriteError> {
    let mut b = CellBuilder::new();
    b.store_string_tail(s)?;
    b.build()
}

/// `map<Int, String>` as Tact lays it out: each leaf holds a reference to
/// the snake string cell.
pub fn options_dictionary(options: &[String]) -> Result<Option<Cell>, WriteError> {
    let mut dict = Dictionary::new(OPTION_KEY_BITS);
    for (i, option) in options.iter().enumerate() {
        let mut leaf = CellBuilder::new();
        leaf.store_ref(string_cell(option)?)?;
        dict.insert_int(i as i128, leaf.build()?)?;
    }
    dict.build()
}

fn load_small_int<T: TryFrom<i128>>(slice: &mut CellSlice, what: &str) -> Result<T, ReadError> {
    let v = slice.load_int(INT_BITS)?;
    T::try_from(v).map_err(|_| ReadError::StructureInvalid(format!("{} out of range: {}", what, v)))
}

impl Serialize for PollMessage {
    fn serialize(&self, b: &mut CellBuilder) -> Result<(), WriteError> {
        b.store_uint(self.opcode() as u128, 32)?;
        match self {
            PollMessage::CreatePoll { subject, options } => {
                b.store_string_ref_tail(subject)?;
                b.store_dict(options_dictionary(options)?)?;
            }
            PollMessage::Vote {
                poll_id,
                option_index,
            } => {
                b.store_int(*poll_id as i128, INT_BITS)?;
                b.store_int(*option_index as i128, INT_BITS)?;
            }
            PollMessage::CreatePollWithFunds(p) => {
                b.store_string_ref_tail(&p.subject)?;
                b.store_string_ref_tail(&p.description)?;
                b.store_uint(p.option_count as u128, 8)?;
                b.store_coins(p.reward_per_vote)?;
                b.store_coins(p.total_reward_fund)?;
                b.store_uint(p.duration as u128, 32)?;
                b.store_bit(p.gasless_enabled)?;
                b.store_address(p.reward_jetton.as_ref())?;
            }
            PollMessage::SetOptionCount { poll_id, count } => {
                b.store_int(*poll_id as i128, INT_BITS)?;
                b.store_int(*count as i128, INT_BITS)?;
            }
            PollMessage::StoreOption {
                poll_id,
                index,
                text,
            } => {
                b.store_int(*poll_id as i128, INT_BITS)?;
                b.store_int(*index as i128, INT_BITS)?;
                b.store_string_ref_tail(text)?;
            }
            PollMessage::InitializeContract { query_id } => {
                b.store_uint(*query_id as u128, 64)?;
            }
        }
        Ok(())
    }
}

impl Deserialize for PollMessage {
    fn deserialize(s: &mut CellSlice) -> Result<Self, ReadError> {
        let op = s.load_u32()?;
        let msg = match op {
            OP_CREATE_POLL => {
                let subject = s.load_string_ref_tail()?;
                let options = decode_options_dictionary(s.load_dict()?)?;
                PollMessage::CreatePoll { subject, options }
            }
            OP_VOTE => PollMessage::Vote {
                poll_id: load_small_int(s, "poll id")?,
                option_index: load_small_int(s, "option index")?,
            },
            OP_CREATE_POLL_WITH_FUNDS => PollMessage::CreatePollWithFunds(FundedPoll {
                subject: s.load_string_ref_tail()?,
                description: s.load_string_ref_tail()?,
                option_count: s.load_u8()?,
                reward_per_vote: s.load_coins()?,
                total_reward_fund: s.load_coins()?,
                duration: s.load_u32()?,
                gasless_enabled: s.load_bit()?,
                reward_jetton: s.load_address()?,
            }),
            OP_SET_OPTION_COUNT => PollMessage::SetOptionCount {
                poll_id: load_small_int(s, "poll id")?,
                count: load_small_int(s, "option count")?,
            },
            OP_STORE_OPTION => PollMessage::StoreOption {
                poll_id: load_small_int(s, "poll id")?,
                index: load_small_int(s, "option index")?,
                text: s.load_string_ref_tail()?,
            },
            OP_INITIALIZE_CONTRACT => PollMessage::InitializeContract {
                query_id: s.load_u64()?,
            },
            other => return Err(ReadError::UnknownTag(other)),
        };
        Ok(msg)
    }
}

fn to_boc(msg: &PollMessage) -> Result<Vec<u8>, PollError> {
    Ok(serialize_boc(&msg.to_cell()?))
}

/// Parse a message body from its bag of cells.
pub fn decode_message(boc: &[u8]) -> Result<PollMessage, ReadError> {
    PollMessage::from_cell(&deserialize_boc(boc)?)
}

pub fn payload_base64(payload: &[u8]) -> String {
    base64::encode(payload)
}

/* encoders ****************************************************************** */

/// Body of a simple-contract poll creation. The options are trimmed and
/// checked (2 to 10, none empty) before anything is encoded.
pub fn encode_create_poll(subject: &str, options: &[String]) -> Result<Vec<u8>, PollError> {
    let options = validate_options(options)?;
    let subject = validate_subject(subject)?;
    to_boc(&PollMessage::CreatePoll { subject, options })
}

pub fn encode_vote(poll_id: u64, option_index: u32) -> Result<Vec<u8>, PollError> {
    if poll_id < 1 {
        return Err(PollError::Validation("poll id must be at least 1".to_string()));
    }
    to_boc(&PollMessage::Vote {
        poll_id,
        option_index,
    })
}

pub fn encode_create_poll_with_funds(poll: &FundedPoll) -> Result<Vec<u8>, PollError> {
    let option_count = poll.option_count as usize;
    if !(2..=MAX_OPTIONS).contains(&option_count) {
        return Err(PollError::Validation(format!(
            "a poll needs between 2 and {} options, got {}",
            MAX_OPTIONS, option_count
        )));
    }
    let subject = validate_subject(&poll.subject)?;
    to_boc(&PollMessage::CreatePollWithFunds(FundedPoll {
        subject,
        ..poll.clone()
    }))
}

pub fn encode_set_option_count(poll_id: u64, count: u32) -> Result<Vec<u8>, PollError> {
    to_boc(&PollMessage::SetOptionCount { poll_id, count })
}

pub fn encode_store_option(poll_id: u64, index: u32, text: &str) -> Result<Vec<u8>, PollError> {
    to_boc(&PollMessage::StoreOption {
        poll_id,
        index,
        text: text.to_string(),
    })
}

pub fn encode_initialize_contract(query_id: u64) -> Result<Vec<u8>, PollError> {
    to_boc(&PollMessage::InitializeContract { query_id })
}

/* decoders ****************************************************************** */

/// Options stored under keys `0..size`, where size is the number of
/// entries. Missing keys and values that are not strings are skipped;
/// keys outside that range are never read.
pub fn decode_options_dictionary(root: Option<&Cell>) -> Result<Vec<String>, ReadError> {
    let dict = Dictionary::parse(OPTION_KEY_BITS, root)?;
    let size = dict.len();
    let mut options = Vec::with_capacity(size);
    for key in 0..size as i128 {
        let value = match dict.get_int(key) {
            Some(value) => value,
            None => {
                tracing::debug!(key = %key, "missing option key skipped");
                continue;
            }
        };
        match option_value(value) {
            Ok(text) => options.push(text),
            Err(e) => tracing::debug!(key = %key, error = %e, "unreadable option skipped"),
        }
    }
    Ok(options)
}

/// A dictionary value holds a reference to the string, or the string itself.
fn option_value(value: &Cell) -> Result<String, ReadError> {
    let mut s = CellSlice::new(value);
    if s.remaining_bits() == 0 && s.remaining_refs() == 1 {
        s.load_string_ref_tail()
    } else {
        s.load_string_tail()
    }
}

fn field<T>(
    fields: &[StackEntry],
    index: usize,
    name: &str,
    extract: impl FnOnce(&StackEntry) -> Result<T, ReadError>,
) -> Option<T> {
    match fields.get(index) {
        None => {
            tracing::debug!(field = name, "missing from getter result");
            None
        }
        Some(StackEntry::Unrecognized(shape)) => {
            tracing::debug!(field = name, %shape, "unrecognized stack item");
            None
        }
        Some(entry) => match extract(entry) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!(field = name, error = %e, "field replaced by placeholder");
                None
            }
        },
    }
}

fn non_negative<T: TryFrom<i128>>(v: i128) -> Result<T, ReadError> {
    T::try_from(v).map_err(|_| ReadError::IntegerOverflow(INT_BITS))
}

/// Simple contract `getPoll(id)`: `(id, creator, subject, options)`.
///
/// Never fails: each unreadable field is replaced by its placeholder and
/// `fallback_id` stands in for an unreadable id.
pub fn decode_poll_tuple(fields: &[StackEntry], fallback_id: u64) -> PollRecord {
    let mut record = PollRecord::placeholder(fallback_id, ContractType::Simple);
    if let Some(id) = field(fields, 0, "id", |e| non_negative(e.to_int()?)) {
        record.id = id;
    }
    record.creator = field(fields, 1, "creator", StackEntry::to_address).flatten();
    if let Some(subject) = field(fields, 2, "subject", StackEntry::to_string_tail) {
        if !subject.trim().is_empty() {
            record.subject = subject;
        }
    }
    if let Some(options) = field(fields, 3, "options", |e| {
        decode_options_dictionary(e.to_maybe_cell()?)
    }) {
        record.options = options;
    }
    record
}

/// Poll manager `getPoll(id)`: `(id, creator, subject, description,
/// start_time, end_time, reward_per_vote, total_reward_fund, gasless,
/// total_votes)`. Options live in the options storage and stay empty here.
pub fn decode_complex_poll_tuple(fields: &[StackEntry], fallback_id: u64) -> PollRecord {
    let mut record = PollRecord::placeholder(fallback_id, ContractType::Complex);
    if let Some(id) = field(fields, 0, "id", |e| non_negative(e.to_int()?)) {
        record.id = id;
    }
    record.creator = field(fields, 1, "creator", StackEntry::to_address).flatten();
    if let Some(subject) = field(fields, 2, "subject", StackEntry::to_string_tail) {
        if !subject.trim().is_empty() {
            record.subject = subject;
        }
    }
    record.description = field(fields, 3, "description", StackEntry::to_string_tail)
        .filter(|d| !d.trim().is_empty());
    record.start_time = field(fields, 4, "start_time", |e| non_negative(e.to_int()?));
    record.end_time = field(fields, 5, "end_time", |e| non_negative(e.to_int()?))
        .filter(|t: &u64| *t > 0);
    record.reward_per_vote = field(fields, 6, "reward_per_vote", |e| non_negative(e.to_int()?));
    record.total_reward_fund =
        field(fields, 7, "total_reward_fund", |e| non_negative(e.to_int()?));
    record.gasless_enabled = field(fields, 8, "gasless", StackEntry::to_bool).unwrap_or(false);
    record.total_votes = field(fields, 9, "total_votes", |e| non_negative(e.to_int()?));
    record
}
