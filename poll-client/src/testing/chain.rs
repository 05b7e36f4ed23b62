use crate::chain::{AccountStatus, ChainError, ChainReader, ContractState, MethodResponse, StackArg};
use crate::codec::{decode_message, options_dictionary, PollMessage};
use crate::model::ManagerAddressSet;
use crate::stack::StackEntry;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use ton_ser::{serialize_boc_base64, Address, Cell, CellBuilder, WriteError};

/// TVM exit code of a call to a get method that does not exist.
pub const EXIT_METHOD_NOT_FOUND: i32 = 11;

/// JSON shape used for getter results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackDialect {
    /// `["num", "0x1"]` at the top level, tonlib entries inside tuples
    TonCenterV2,
    /// `{"type": "num", "value": "0x1"}` everywhere
    V3,
}

#[derive(Debug, Clone, Default)]
struct MockPoll {
    creator: Option<Address>,
    subject: String,
    description: String,
    options: BTreeMap<u32, String>,
    option_count: u32,
    votes: BTreeMap<u32, u64>,
    start_time: u64,
    end_time: u64,
    reward_per_vote: u128,
    total_reward_fund: u128,
    gasless_enabled: bool,
}

impl MockPoll {
    fn option_list(&self) -> Vec<String> {
        self.options.values().cloned().collect()
    }

    fn total_votes(&self) -> u64 {
        self.votes.values().sum()
    }
}

#[derive(Debug, Default)]
struct MockState {
    simple: Vec<MockPoll>,
    complex: Vec<MockPoll>,
    complex_initialized: bool,
    frozen: bool,
    missing_methods: HashSet<String>,
    failing_polls: HashSet<u64>,
    calls: Vec<String>,
}

/// In-memory deployment of both poll contracts.
///
/// Messages sent through `MockWallet` are decoded and applied; getters are
/// answered in the configured stack dialect.
pub struct MockChain {
    state: Mutex<MockState>,
    dialect: StackDialect,
    simple: Address,
    complex: Address,
    managers: [Address; 4],
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

fn address(byte: u8) -> Address {
    Address::new(0, [byte; 32])
}

impl MockChain {
    pub fn new() -> Self {
        MockChain {
            state: Mutex::new(MockState::default()),
            dialect: StackDialect::TonCenterV2,
            simple: address(0x51),
            complex: address(0xc0),
            managers: [address(0xc1), address(0xc2), address(0xc3), address(0xc4)],
        }
    }

    pub fn with_dialect(mut self, dialect: StackDialect) -> Self {
        self.dialect = dialect;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn simple_address(&self) -> Address {
        self.simple
    }

    pub fn complex_address(&self) -> Address {
        self.complex
    }

    fn poll_manager(&self) -> &Address {
        &self.managers[0]
    }

    fn response_manager(&self) -> &Address {
        &self.managers[1]
    }

    fn fund_manager(&self) -> &Address {
        &self.managers[2]
    }

    fn options_storage(&self) -> &Address {
        &self.managers[3]
    }

    pub fn complex_managers(&self) -> ManagerAddressSet {
        ManagerAddressSet {
            poll_manager: Some(*self.poll_manager()),
            response_manager: Some(*self.response_manager()),
            fund_manager: Some(*self.fund_manager()),
            options_storage: Some(*self.options_storage()),
        }
    }

    pub fn initialize_complex(&self) {
        self.state().complex_initialized = true;
    }

    /// Accept messages without applying them, as if they never landed.
    pub fn freeze(&self) {
        self.state().frozen = true;
    }

    /// Answer calls to `method` with the "method not found" exit code.
    pub fn fail_method(&self, method: &str) {
        self.state().missing_methods.insert(method.to_string());
    }

    /// Make every per-poll read of `poll_id` fail at the node.
    pub fn fail_poll(&self, poll_id: u64) {
        self.state().failing_polls.insert(poll_id);
    }

    /// Names of the get methods called so far.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn seed_simple_poll(&self, subject: &str, options: &[&str], creator: Option<Address>) -> u64 {
        let mut state = self.state();
        state.simple.push(MockPoll {
            creator,
            subject: subject.to_string(),
            options: options
                .iter()
                .enumerate()
                .map(|(i, o)| (i as u32, o.to_string()))
                .collect(),
            option_count: options.len() as u32,
            ..MockPoll::default()
        });
        state.simple.len() as u64
    }

    pub fn seed_complex_poll(&self, subject: &str, options: &[&str], gasless_enabled: bool) -> u64 {
        let mut state = self.state();
        state.complex.push(MockPoll {
            creator: Some(address(0xee)),
            subject: subject.to_string(),
            options: options
                .iter()
                .enumerate()
                .map(|(i, o)| (i as u32, o.to_string()))
                .collect(),
            option_count: options.len() as u32,
            gasless_enabled,
            ..MockPoll::default()
        });
        state.complex.len() as u64
    }

    pub fn simple_poll_count(&self) -> u64 {
        self.state().simple.len() as u64
    }

    /// Votes per option of a simple poll.
    pub fn simple_votes(&self, poll_id: u64) -> Vec<u64> {
        let state = self.state();
        match poll_index(poll_id, state.simple.len()) {
            Some(i) => {
                let poll = &state.simple[i];
                (0..poll.option_count)
                    .map(|o| poll.votes.get(&o).copied().unwrap_or(0))
                    .collect()
            }
            None => Vec::new(),
        }
    }

    pub fn complex_votes(&self, poll_id: u64) -> u64 {
        let state = self.state();
        poll_index(poll_id, state.complex.len())
            .map(|i| state.complex[i].total_votes())
            .unwrap_or(0)
    }

    pub fn complex_option_count(&self, poll_id: u64) -> u32 {
        let state = self.state();
        poll_index(poll_id, state.complex.len())
            .map(|i| state.complex[i].option_count)
            .unwrap_or(0)
    }

    /// Apply a message body sent by `sender` to `destination`.
    pub fn apply(&self, sender: &Address, destination: &Address, body: &[u8]) -> Result<(), String> {
        let message = decode_message(body).map_err(|e| e.to_string())?;
        let mut state = self.state();
        if state.frozen {
            return Ok(());
        }
        let on_complex = *destination == self.complex;
        let on_options = *destination == *self.options_storage();
        match message {
            PollMessage::CreatePoll { subject, options } if *destination == self.simple => {
                state.simple.push(MockPoll {
                    creator: Some(*sender),
                    subject,
                    option_count: options.len() as u32,
                    options: options
                        .into_iter()
                        .enumerate()
                        .map(|(i, o)| (i as u32, o))
                        .collect(),
                    ..MockPoll::default()
                });
            }
            PollMessage::Vote {
                poll_id,
                option_index,
            } => {
                let polls = if on_complex {
                    &mut state.complex
                } else if *destination == self.simple {
                    &mut state.simple
                } else {
                    return Err(format!("vote sent to {}", destination));
                };
                let i = poll_index(poll_id, polls.len()).ok_or("no such poll")?;
                let poll = &mut polls[i];
                if option_index >= poll.option_count {
                    return Err("option out of range".to_string());
                }
                *poll.votes.entry(option_index).or_insert(0) += 1;
            }
            PollMessage::InitializeContract { .. } if on_complex => {
                state.complex_initialized = true;
            }
            PollMessage::CreatePollWithFunds(funded) if on_complex && state.complex_initialized => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                state.complex.push(MockPoll {
                    creator: Some(*sender),
                    subject: funded.subject,
                    description: funded.description,
                    start_time: now,
                    end_time: if funded.duration == 0 {
                        0
                    } else {
                        now + funded.duration as u64
                    },
                    reward_per_vote: funded.reward_per_vote,
                    total_reward_fund: funded.total_reward_fund,
                    gasless_enabled: funded.gasless_enabled,
                    ..MockPoll::default()
                });
            }
            PollMessage::SetOptionCount { poll_id, count } if on_options => {
                let i = poll_index(poll_id, state.complex.len()).ok_or("no such poll")?;
                state.complex[i].option_count = count;
            }
            PollMessage::StoreOption {
                poll_id,
                index,
                text,
            } if on_options => {
                let i = poll_index(poll_id, state.complex.len()).ok_or("no such poll")?;
                state.complex[i].options.insert(index, text);
            }
            other => return Err(format!("{:?} rejected by {}", other, destination)),
        }
        Ok(())
    }

    fn answer(&self, address: &Address, method: &str, args: &[i128]) -> Result<Vec<StackEntry>, ChainError> {
        let state = self.state();
        let poll_arg = args.first().and_then(|v| u64::try_from(*v).ok()).unwrap_or(0);
        if args.first().is_some() && state.failing_polls.contains(&poll_arg) {
            return Err(ChainError::Node(format!("cannot read poll {}", poll_arg)));
        }
        let encode = |e: WriteError| ChainError::Malformed(e.to_string());

        if *address == self.simple {
            let poll = poll_index(poll_arg, state.simple.len()).map(|i| &state.simple[i]);
            return match method {
                "getPollCount" => Ok(vec![StackEntry::Int(state.simple.len() as i128)]),
                "getPollOptions" => Ok(vec![match poll {
                    Some(p) => match options_dictionary(&p.option_list()).map_err(encode)? {
                        Some(root) => StackEntry::Cell(root),
                        None => StackEntry::Null,
                    },
                    None => StackEntry::Null,
                }]),
                "getPoll" => match poll {
                    Some(p) => Ok(vec![StackEntry::Tuple(vec![
                        StackEntry::Int(poll_arg as i128),
                        address_entry(p.creator.as_ref()).map_err(encode)?,
                        StackEntry::Cell(string_cell(&p.subject).map_err(encode)?),
                        match options_dictionary(&p.option_list()).map_err(encode)? {
                            Some(root) => StackEntry::Cell(root),
                            None => StackEntry::Null,
                        },
                    ])]),
                    None => Ok(vec![StackEntry::Null]),
                },
                _ => Err(not_found(method)),
            };
        }

        let initialized = state.complex_initialized;
        let poll = poll_index(poll_arg, state.complex.len()).map(|i| &state.complex[i]);
        if *address == self.complex {
            let manager = |a: &Address| -> Result<Vec<StackEntry>, ChainError> {
                if initialized {
                    Ok(vec![address_entry(Some(a)).map_err(encode)?])
                } else {
                    Ok(vec![address_entry(None).map_err(encode)?])
                }
            };
            return match method {
                "isInitialized" => Ok(vec![StackEntry::Int(if initialized { -1 } else { 0 })]),
                "getPollCount" => Ok(vec![StackEntry::Int(state.complex.len() as i128)]),
                "getPollManager" => manager(self.poll_manager()),
                "getResponseManager" => manager(self.response_manager()),
                "getFundManager" => manager(self.fund_manager()),
                "getOptionsStorage" => manager(self.options_storage()),
                _ => Err(not_found(method)),
            };
        }
        if !initialized {
            return Err(ChainError::NotDeployed(address.to_string()));
        }
        if address == self.poll_manager() && method == "getPoll" {
            return match poll {
                Some(p) => Ok(vec![StackEntry::Tuple(vec![
                    StackEntry::Int(poll_arg as i128),
                    address_entry(p.creator.as_ref()).map_err(encode)?,
                    StackEntry::Cell(string_cell(&p.subject).map_err(encode)?),
                    StackEntry::Cell(string_cell(&p.description).map_err(encode)?),
                    StackEntry::Int(p.start_time as i128),
                    StackEntry::Int(p.end_time as i128),
                    StackEntry::Int(p.reward_per_vote as i128),
                    StackEntry::Int(p.total_reward_fund as i128),
                    StackEntry::Int(if p.gasless_enabled { -1 } else { 0 }),
                    StackEntry::Int(p.total_votes() as i128),
                ])]),
                None => Ok(vec![StackEntry::Null]),
            };
        }
        if address == self.options_storage() {
            return match method {
                "getOptionCount" => Ok(vec![StackEntry::Int(poll.map_or(0, |p| p.option_count) as i128)]),
                "getOption" => {
                    let index = args.get(1).and_then(|v| u32::try_from(*v).ok());
                    match poll.and_then(|p| index.and_then(|i| p.options.get(&i))) {
                        Some(text) => Ok(vec![StackEntry::Cell(string_cell(text).map_err(encode)?)]),
                        None => Ok(vec![StackEntry::Null]),
                    }
                }
                _ => Err(not_found(method)),
            };
        }
        if address == self.fund_manager() && method == "getPollFunds" {
            return Ok(vec![StackEntry::Int(poll.map_or(0, |p| p.total_reward_fund) as i128)]);
        }
        Err(not_found(method))
    }

    fn to_json(&self, entry: &StackEntry, nested: bool) -> Value {
        match (self.dialect, nested) {
            (StackDialect::V3, _) => match entry {
                StackEntry::Int(v) => json!({"type": "num", "value": hex_int(*v)}),
                StackEntry::Cell(c) => json!({"type": "cell", "value": serialize_boc_base64(c)}),
                StackEntry::Slice(c) => json!({"type": "slice", "value": serialize_boc_base64(c)}),
                StackEntry::Tuple(items) => json!({
                    "type": "tuple",
                    "value": items.iter().map(|i| self.to_json(i, true)).collect::<Vec<_>>()
                }),
                StackEntry::Null | StackEntry::Unrecognized(_) => json!({"type": "null"}),
            },
            (StackDialect::TonCenterV2, false) => match entry {
                StackEntry::Int(v) => json!(["num", hex_int(*v)]),
                StackEntry::Cell(c) | StackEntry::Slice(c) => {
                    json!(["cell", {"bytes": serialize_boc_base64(c), "object": {}}])
                }
                StackEntry::Tuple(items) => json!(["tuple", {
                    "@type": "tvm.tuple",
                    "elements": items.iter().map(|i| self.to_json(i, true)).collect::<Vec<_>>()
                }]),
                StackEntry::Null | StackEntry::Unrecognized(_) => json!(["null", null]),
            },
            (StackDialect::TonCenterV2, true) => match entry {
                StackEntry::Int(v) => json!({
                    "@type": "tvm.stackEntryNumber",
                    "number": {"@type": "tvm.numberDecimal", "number": v.to_string()}
                }),
                StackEntry::Cell(c) => json!({
                    "@type": "tvm.stackEntryCell",
                    "cell": {"@type": "tvm.cell", "bytes": serialize_boc_base64(c)}
                }),
                StackEntry::Slice(c) => json!({
                    "@type": "tvm.stackEntrySlice",
                    "slice": {"@type": "tvm.slice", "bytes": serialize_boc_base64(c)}
                }),
                StackEntry::Tuple(items) => json!({
                    "@type": "tvm.stackEntryTuple",
                    "tuple": {
                        "@type": "tvm.tuple",
                        "elements": items.iter().map(|i| self.to_json(i, true)).collect::<Vec<_>>()
                    }
                }),
                StackEntry::Null | StackEntry::Unrecognized(_) => json!({"@type": "tvm.stackEntryNull"}),
            },
        }
    }
}

fn poll_index(poll_id: u64, len: usize) -> Option<usize> {
    if poll_id >= 1 && poll_id <= len as u64 {
        Some(poll_id as usize - 1)
    } else {
        None
    }
}

fn not_found(method: &str) -> ChainError {
    ChainError::ExitCode {
        method: method.to_string(),
        exit_code: EXIT_METHOD_NOT_FOUND,
    }
}

fn hex_int(v: i128) -> String {
    if v < 0 {
        format!("-{:#x}", v.unsigned_abs())
    } else {
        format!("{:#x}", v)
    }
}

fn string_cell(s: &str) -> Result<Cell, WriteError> {
    let mut b = CellBuilder::new();
    b.store_string_tail(s)?;
    b.build()
}

fn address_entry(address: Option<&Address>) -> Result<StackEntry, WriteError> {
    let mut b = CellBuilder::new();
    b.store_address(address)?;
    Ok(StackEntry::Slice(b.build()?))
}

#[async_trait]
impl ChainReader for MockChain {
    async fn run_method(
        &self,
        address: &Address,
        method: &str,
        args: &[StackArg],
    ) -> Result<MethodResponse, ChainError> {
        {
            let mut state = self.state();
            state.calls.push(method.to_string());
            if state.missing_methods.contains(method) {
                return Ok(MethodResponse {
                    stack: Vec::new(),
                    exit_code: Some(EXIT_METHOD_NOT_FOUND),
                });
            }
        }
        let args: Vec<i128> = args.iter().map(|StackArg::Int(v)| *v).collect();
        match self.answer(address, method, &args) {
            Ok(stack) => Ok(MethodResponse {
                stack: stack.iter().map(|e| self.to_json(e, false)).collect(),
                exit_code: Some(0),
            }),
            Err(ChainError::ExitCode { exit_code, .. }) => Ok(MethodResponse {
                stack: Vec::new(),
                exit_code: Some(exit_code),
            }),
            Err(e) => Err(e),
        }
    }

    async fn contract_state(&self, address: &Address) -> Result<ContractState, ChainError> {
        let initialized = self.state().complex_initialized;
        let deployed = *address == self.simple
            || *address == self.complex
            || (initialized && self.managers.contains(address));
        Ok(ContractState {
            status: if deployed {
                AccountStatus::Active
            } else {
                AccountStatus::Nonexistent
            },
            balance: if deployed { 1_000_000_000 } else { 0 },
        })
    }
}
