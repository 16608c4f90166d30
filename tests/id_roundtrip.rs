use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use jobtail::job::log_file::{parse_log, render_header, Footer};
use jobtail::job::{JobId, JobState, LOG_SUFFIX};

// Nanosecond timestamps that fit in i64 (roughly 1677..2262).
fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (-9_000_000_000i64..9_000_000_000i64, 0u32..1_000_000_000u32)
        .prop_map(|(secs, nanos)| Utc.timestamp_opt(secs, nanos).unwrap())
}

proptest! {
    #[test]
    fn id_decodes_to_its_command_and_timestamp(
        command in "\\PC{1,120}",
        created_at in timestamp_strategy(),
    ) {
        let id = JobId::encode(&command, created_at).unwrap();
        let (decoded_cmd, decoded_at) = id.decode().unwrap();
        prop_assert_eq!(decoded_cmd, command);
        prop_assert_eq!(decoded_at, created_at);
    }

    #[test]
    fn id_survives_the_log_file_name(
        command in "[ -~]{1,80}",
        created_at in timestamp_strategy(),
    ) {
        let id = JobId::encode(&command, created_at).unwrap();
        let name = id.log_file_name();

        prop_assert!(name.ends_with(LOG_SUFFIX));
        prop_assert!(!name.contains('/'), "file name must stay in the log directory");
        prop_assert_eq!(JobId::from_log_file_name(&name), Some(id));
    }
}

#[test]
fn separator_inside_command_is_preserved() {
    let at = Utc.timestamp_opt(1_700_000_000, 123).unwrap();
    let id = JobId::encode("echo a|b | grep b", at).unwrap();
    assert_eq!(id.decode().unwrap(), ("echo a|b | grep b".to_string(), at));
}

#[test]
fn malformed_ids_are_rejected() {
    for raw in ["", "***", "bm8tc2VwYXJhdG9y", "ZWNobyBofG5vdC1hLW51bWJlcg"] {
        assert!(JobId::parse(raw).is_err(), "{raw:?} should not parse");
    }
    assert_eq!(JobId::from_log_file_name("notes.txt"), None);
}

#[test]
fn states_only_move_forward() {
    use JobState::*;

    let all = [Created, Running, Completed, Killed, Failed];
    let allowed = [
        (Created, Running),
        (Created, Failed),
        (Running, Completed),
        (Running, Killed),
        (Running, Failed),
    ];
    for from in all {
        for to in all {
            assert_eq!(
                from.can_transition_to(to),
                allowed.contains(&(from, to)),
                "{from} -> {to}"
            );
        }
    }
    for state in all {
        assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        assert_eq!(state.is_terminal(), matches!(state, Completed | Killed | Failed));
    }
}

#[test]
fn header_and_footer_parse_back() {
    let started = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let ended = Utc.timestamp_opt(1_700_000_042, 0).unwrap();
    let footer = Footer {
        ended_at: ended,
        elapsed: Duration::from_millis(42_250),
        exit_code: None,
        status: JobState::Killed,
    };
    let log = format!(
        "{}some output\nStatus:completed\nmore output\n{}",
        render_header(started, "ls -la"),
        footer.render()
    );

    assert!(log.starts_with("Start:2023-11-14T22:13:20Z\nCommand:ls -la\n\n"));
    assert!(!log.contains("Exit:"), "signal deaths have no exit line");

    let summary = parse_log(&log);
    assert_eq!(summary.started_at, Some(started));
    assert_eq!(summary.command.as_deref(), Some("ls -la"));
    assert_eq!(summary.ended_at, Some(ended));
    assert_eq!(summary.elapsed, Some(Duration::from_millis(42_250)));
    assert_eq!(summary.exit_code, None);
    assert_eq!(summary.status, Some(JobState::Killed));
}

#[test]
fn output_that_looks_like_a_footer_is_not_one() {
    let started = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let log = format!(
        "{}Exit:7\nStatus:killed\n",
        render_header(started, "printf 'Exit:7\\nStatus:killed\\n'")
    );

    let summary = parse_log(&log);
    assert_eq!(summary.status, None);
    assert_eq!(summary.exit_code, None);
}
