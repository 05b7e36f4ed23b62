//! Conversions between gateway records, consumer-facing polls and the
//! request shapes each contract variant expects. No I/O.

use crate::error::PollError;
use crate::model::{
    ContractType, CreatePollRequest, Poll, PollForm, PollRecord, SimpleCreateRequest, VoteOptions,
    VoteRequest, NO_DESCRIPTION, UNKNOWN_CREATOR,
};
use std::time::{SystemTime, UNIX_EPOCH};

pub const NANOTONS_PER_TON: u128 = 1_000_000_000;
const SECONDS_PER_DAY: u64 = 86_400;

/// Jetton contracts accepted as reward tokens.
const JETTONS: &[(&str, &str)] = &[
    ("USDT", "EQCxE6mUtQJKFnGfaROTKOt1lZbDiiX1kCixRv7Nw2Id_sDs"),
    ("NOT", "EQAvlWFDxGF2lXm67y4yzC17wYKD9A0guwPkMs1gOsM__NOT"),
    ("DOGS", "EQCvxJy4eG8hyHBFsZ7eePxrRsUQSFE_jpptRAYBmcG_DOGS"),
];

/// Jetton contract of a reward token. Native TON and unknown keys have none.
pub fn jetton_wallet(token: &str) -> Option<&'static str> {
    let token = token.trim();
    JETTONS
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(token))
        .map(|(_, address)| *address)
}

/// `1_500_000_000` -> `"1.5 TON"`
pub fn format_ton(nanotons: u128) -> String {
    let whole = nanotons / NANOTONS_PER_TON;
    let frac = nanotons % NANOTONS_PER_TON;
    if frac == 0 {
        format!("{} TON", whole)
    } else {
        let digits = format!("{:09}", frac);
        format!("{}.{} TON", whole, digits.trim_end_matches('0'))
    }
}

/// `"1.5"` (optionally suffixed with `TON`) -> `1_500_000_000`
pub fn parse_ton(amount: &str) -> Result<u128, PollError> {
    let invalid = || PollError::Validation(format!("invalid TON amount '{}'", amount));
    let s = amount.trim();
    let s = s.strip_suffix("TON").unwrap_or(s).trim();
    if s.is_empty() {
        return Err(invalid());
    }
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if frac.len() > 9
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !frac.chars().all(|c| c.is_ascii_digit())
        || (whole.is_empty() && frac.is_empty())
    {
        return Err(invalid());
    }
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let frac: u128 = if frac.is_empty() {
        0
    } else {
        format!("{:0<9}", frac).parse().map_err(|_| invalid())?
    };
    whole
        .checked_mul(NANOTONS_PER_TON)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(invalid)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn normalize_poll(record: &PollRecord, contract_type: ContractType) -> Poll {
    normalize_poll_at(record, contract_type, now_secs())
}

/// Fill every consumer-facing field. Simple polls are always active and
/// carry no economics; complex polls derive activity and the remaining days
/// from their time window as seen at `now` (unix seconds).
pub fn normalize_poll_at(record: &PollRecord, contract_type: ContractType, now: u64) -> Poll {
    let creator_address = record
        .creator
        .as_ref()
        .map(|a| a.to_string())
        .unwrap_or_else(|| UNKNOWN_CREATOR.to_string());
    let description = record
        .description
        .clone()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| NO_DESCRIPTION.to_string());

    let mut poll = Poll {
        id: record.id,
        title: record.subject.clone(),
        description,
        options: record.options.clone(),
        creator_address,
        total_votes: record.total_votes.unwrap_or(0),
        is_active: true,
        reward_per_vote: format_ton(0),
        total_reward_fund: format_ton(0),
        gasless_enabled: false,
        contract_type,
        days_remaining: None,
    };

    if contract_type == ContractType::Complex {
        let started = record.start_time.map_or(true, |start| start <= now);
        let ended = record.end_time.map_or(false, |end| end <= now);
        poll.is_active = started && !ended;
        poll.days_remaining = record.end_time.map(|end| {
            let left = end.saturating_sub(now);
            let days = left / SECONDS_PER_DAY + u64::from(left % SECONDS_PER_DAY != 0);
            days.min(u32::MAX as u64) as u32
        });
        poll.reward_per_vote = format_ton(record.reward_per_vote.unwrap_or(0));
        poll.total_reward_fund = format_ton(record.total_reward_fund.unwrap_or(0));
        poll.gasless_enabled = record.gasless_enabled;
    }
    poll
}

/// Request shape of the target gateway. The simple path keeps only what the
/// simple contract knows about and resolves the reward token to its jetton
/// contract; the complex path takes the form as is.
pub fn denormalize_create_request(form: &PollForm, contract_type: ContractType) -> CreatePollRequest {
    match contract_type {
        ContractType::Simple => CreatePollRequest::Simple(SimpleCreateRequest {
            subject: form.subject.clone(),
            options: form.options.clone(),
            created_by: form.created_by.clone(),
            reward_per_vote: form.reward_per_vote.clone(),
            jetton_reward_wallet: form
                .reward_token
                .as_deref()
                .and_then(jetton_wallet)
                .map(str::to_string),
            jetton_reward_per_vote: form.jetton_reward_per_vote.clone(),
        }),
        ContractType::Complex => CreatePollRequest::Complex(form.clone()),
    }
}

/// The simple contract has no gasless voting; its requests drop the flag
/// and any extra options.
pub fn denormalize_vote_request(
    poll_id: u64,
    option_index: u32,
    options: &VoteOptions,
    contract_type: ContractType,
) -> VoteRequest {
    let mut request = VoteRequest::new(poll_id, option_index);
    if contract_type == ContractType::Complex {
        request.use_gasless_voting = options.use_gasless_voting;
        request.extra = options.extra.clone();
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NO_SUBJECT;
    use quickcheck_macros::quickcheck;
    use serde_json::json;
    use ton_ser::Address;

    const NOW: u64 = 1_700_000_000;

    fn complex_record() -> PollRecord {
        PollRecord {
            id: 3,
            subject: "Lunch".to_string(),
            description: Some("Where".to_string()),
            options: vec!["Pizza".to_string(), "Sushi".to_string()],
            creator: Some(format!("0:{}", "22".repeat(32)).parse::<Address>().unwrap()),
            total_votes: Some(4),
            start_time: Some(NOW - 10),
            end_time: Some(NOW + 2 * SECONDS_PER_DAY + 1),
            reward_per_vote: Some(100_000_000),
            total_reward_fund: Some(5 * NANOTONS_PER_TON),
            gasless_enabled: true,
            contract_type: ContractType::Complex,
        }
    }

    #[quickcheck]
    fn simple_polls_never_carry_economics(record: PollRecord, now: u64) -> bool {
        let poll = normalize_poll_at(&record, ContractType::Simple, now);
        !poll.gasless_enabled
            && poll.total_reward_fund == "0 TON"
            && poll.reward_per_vote == "0 TON"
            && poll.is_active
            && poll.days_remaining.is_none()
    }

    #[quickcheck]
    fn ton_amounts_round_trip(nanotons: u64) -> bool {
        let formatted = format_ton(nanotons as u128);
        parse_ton(&formatted).unwrap() == nanotons as u128
    }

    #[test]
    fn complex_poll_is_normalized() {
        let poll = normalize_poll_at(&complex_record(), ContractType::Complex, NOW);
        assert!(poll.is_active);
        assert!(poll.gasless_enabled);
        assert_eq!(poll.days_remaining, Some(3));
        assert_eq!(poll.reward_per_vote, "0.1 TON");
        assert_eq!(poll.total_reward_fund, "5 TON");
        assert_eq!(poll.total_votes, 4);
        assert_eq!(poll.description, "Where");
    }

    #[test]
    fn ended_poll_has_zero_days_left() {
        let mut record = complex_record();
        record.end_time = Some(NOW - SECONDS_PER_DAY);
        let poll = normalize_poll_at(&record, ContractType::Complex, NOW);
        assert!(!poll.is_active);
        assert_eq!(poll.days_remaining, Some(0));
    }

    #[test]
    fn placeholders_are_filled() {
        let poll = normalize_poll_at(
            &PollRecord::placeholder(9, ContractType::Simple),
            ContractType::Simple,
            NOW,
        );
        assert_eq!(poll.title, NO_SUBJECT);
        assert_eq!(poll.description, NO_DESCRIPTION);
        assert_eq!(poll.creator_address, UNKNOWN_CREATOR);
        assert_eq!(poll.total_votes, 0);
    }

    #[test]
    fn ton_formatting() {
        assert_eq!(format_ton(0), "0 TON");
        assert_eq!(format_ton(1_500_000_000), "1.5 TON");
        assert_eq!(format_ton(1), "0.000000001 TON");
        assert_eq!(parse_ton("0.1").unwrap(), 100_000_000);
        assert_eq!(parse_ton(" 2 TON").unwrap(), 2 * NANOTONS_PER_TON);
        assert_eq!(parse_ton(".5").unwrap(), 500_000_000);
        for bad in ["", "1.2.3", "-1", "0.0000000001", "abc", "."] {
            assert!(parse_ton(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn reward_token_resolution() {
        assert!(jetton_wallet("USDT").is_some());
        assert!(jetton_wallet("dogs").is_some());
        assert_eq!(jetton_wallet("TON"), None);
        assert_eq!(jetton_wallet("SHIB"), None);
    }

    #[test]
    fn create_request_per_variant() {
        let form = PollForm {
            subject: "Best color?".to_string(),
            options: vec!["Red".to_string(), "Blue".to_string()],
            reward_token: Some("UNKNOWN".to_string()),
            duration_days: Some(7),
            ..PollForm::default()
        };
        match denormalize_create_request(&form, ContractType::Simple) {
            CreatePollRequest::Simple(r) => {
                assert_eq!(r.subject, "Best color?");
                assert_eq!(r.jetton_reward_wallet, None);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            denormalize_create_request(&form, ContractType::Complex),
            CreatePollRequest::Complex(form.clone())
        );
    }

    #[test]
    fn vote_request_per_variant() {
        let options: VoteOptions =
            serde_json::from_value(json!({"useGaslessVoting": true, "referrer": "x"})).unwrap();
        let complex = denormalize_vote_request(5, 0, &options, ContractType::Complex);
        assert_eq!(complex.use_gasless_voting, Some(true));
        assert_eq!(complex.extra.get("referrer"), Some(&json!("x")));
        let simple = denormalize_vote_request(5, 0, &options, ContractType::Simple);
        assert_eq!(simple.use_gasless_voting, None);
        assert!(simple.extra.is_empty());
    }
}
