//! Matching engine scenarios
//!
//! Covers the quantity-window classification property, the approval gate,
//! predicate error surfacing, and the over-defined resolution walkthrough.

use common::approval::{ApprovalState, ApprovalVerdict, CalibrationLookup};
use common::identity::InstrumentIdentity;
use common::test_utils::FixedApproval;
use matcher::{
    AcceptAll, AvailableDevice, DeviceDescriptor, DeviceRequirement, FnPolicy, ManualProtocol,
    MatchError, MatchState, Matcher, Protocol, Verdict, classify,
};
use proptest::prelude::*;

fn manual_device(name: &str, serial: &str) -> AvailableDevice {
    let identity = InstrumentIdentity {
        manufacturer: "Test Instruments".to_string(),
        model: name.to_string(),
        serial: serial.to_string(),
        firmware: "1.0".to_string(),
    };
    AvailableDevice::new(
        DeviceDescriptor {
            protocol_name: "manual".to_string(),
            device_name: name.to_string(),
            identity: Some(identity.clone()),
            target: format!("manual:{}", serial),
        },
        Protocol::Manual(ManualProtocol {
            device_name: name.to_string(),
            identity: Some(identity),
        }),
    )
}

fn rpc_device(name: &str) -> AvailableDevice {
    AvailableDevice::new(
        DeviceDescriptor {
            protocol_name: "rpc".to_string(),
            device_name: name.to_string(),
            identity: None,
            target: format!("rpc:{}", name),
        },
        Protocol::Rpc(matcher::RpcProtocol {
            device_name: name.to_string(),
            endpoint: "tcp://10.0.0.9:7001".to_string(),
        }),
    )
}

const APPROVED: FixedApproval = FixedApproval(ApprovalState::Approved);

#[test]
fn test_full_defined_auto_selects() {
    let matcher = Matcher::new(&AcceptAll, &APPROVED);
    let session = matcher.run(
        vec![DeviceRequirement::single("dmm", "manual")],
        vec![manual_device("34465A", "SN1")],
    );

    assert!(session.was_successful());
    let matched = session.into_matched_devices().expect("match failed");
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].alias, "dmm");
    assert_eq!(matched[0].descriptor.device_name, "34465A");
}

#[test]
fn test_under_defined_is_hard_failure() {
    let matcher = Matcher::new(&AcceptAll, &APPROVED);
    let session = matcher.run(
        vec![DeviceRequirement::new("psu", "manual", 2, 3).expect("valid window")],
        vec![manual_device("E3631A", "SN1")],
    );

    assert!(!session.was_successful());
    assert_eq!(session.entry("psu").unwrap().state(), MatchState::UnderDefined);
    assert_eq!(
        session.into_matched_devices().unwrap_err(),
        MatchError::UnderDefinedRequirement {
            alias: "psu".to_string(),
            found: 1,
            needed: 2,
        }
    );
}

#[test]
fn test_over_defined_resolution_walkthrough() {
    // Two accepted candidates for a single-quantity requirement: the match
    // starts over-defined with both selected, and resolving one candidate
    // auto-deselects the other.
    let matcher = Matcher::new(&AcceptAll, &APPROVED);
    let mut session = matcher.run(
        vec![DeviceRequirement::single("dmm", "manual")],
        vec![
            manual_device("34465A", "SN1"),
            manual_device("34465A", "SN2"),
        ],
    );

    let entry = session.entry("dmm").unwrap();
    assert_eq!(entry.state(), MatchState::OverDefined);
    assert_eq!(entry.selected_count(), 2);
    assert!(!session.was_successful());

    session.set_selected("dmm", 1, true).expect("resolve failed");

    let entry = session.entry("dmm").unwrap();
    assert_eq!(entry.state(), MatchState::FullDefined);
    assert_eq!(entry.selected_count(), 1);
    assert!(session.was_successful());

    let matched = session.into_matched_devices().expect("match failed");
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].descriptor.identity.as_ref().unwrap().serial, "SN2");
}

#[test]
fn test_unresolved_over_defined_is_ambiguous() {
    let matcher = Matcher::new(&AcceptAll, &APPROVED);
    let session = matcher.run(
        vec![DeviceRequirement::single("dmm", "manual")],
        vec![
            manual_device("34465A", "SN1"),
            manual_device("34465A", "SN2"),
        ],
    );

    assert_eq!(
        session.into_matched_devices().unwrap_err(),
        MatchError::AmbiguousRequirement {
            alias: "dmm".to_string(),
            selected: 2,
            max: 1,
        }
    );
}

#[test]
fn test_name_filter_restricts_candidates() {
    let matcher = Matcher::new(&AcceptAll, &APPROVED);
    let session = matcher.run(
        vec![
            DeviceRequirement::single("dmm", "manual")
                .with_name_filters(vec!["34470A".to_string()]),
        ],
        vec![
            manual_device("34465A", "SN1"),
            manual_device("34470A", "SN2"),
        ],
    );

    let entry = session.entry("dmm").unwrap();
    assert_eq!(entry.candidates().len(), 1);
    assert_eq!(entry.candidates()[0].descriptor.device_name, "34470A");
    assert!(session.was_successful());
}

#[test]
fn test_in_use_devices_are_never_candidates() {
    let matcher = Matcher::new(&AcceptAll, &APPROVED);
    let mut busy = manual_device("34465A", "SN1");
    busy.in_use = true;

    let session = matcher.run(vec![DeviceRequirement::single("dmm", "manual")], vec![busy]);
    assert_eq!(session.entry("dmm").unwrap().candidates().len(), 0);
    assert!(!session.was_successful());
}

#[test]
fn test_unapproved_devices_excluded_before_acceptance() {
    // The predicate records what it saw: the expired device must never
    // reach it.
    use std::sync::Mutex;
    struct Recording(Mutex<Vec<String>>);
    impl matcher::AcceptancePolicy for Recording {
        fn evaluate(&self, d: &DeviceDescriptor) -> anyhow::Result<Option<String>> {
            self.0
                .lock()
                .expect("lock poisoned")
                .push(d.device_name.clone());
            Ok(None)
        }
    }

    struct ExpiredForSn1;
    impl CalibrationLookup for ExpiredForSn1 {
        fn approval(&self, identity: &InstrumentIdentity, _: &str) -> ApprovalVerdict {
            ApprovalVerdict {
                state: if identity.serial == "SN1" {
                    ApprovalState::Expired
                } else {
                    ApprovalState::Approved
                },
                summary: "test record".to_string(),
            }
        }
    }

    let recording = Recording(Mutex::new(Vec::new()));
    let matcher = Matcher::new(&recording, &ExpiredForSn1);
    let session = matcher.run(
        vec![DeviceRequirement::single("dmm", "manual")],
        vec![
            manual_device("EXPIRED-1", "SN1"),
            manual_device("FRESH-2", "SN2"),
        ],
    );

    let entry = session.entry("dmm").unwrap();
    assert!(matches!(
        &entry.candidates()[0].verdict,
        Verdict::Rejected(reason) if reason.contains("expired")
    ));
    assert!(session.was_successful());
    assert_eq!(
        *recording.0.lock().expect("lock poisoned"),
        vec!["FRESH-2".to_string()]
    );
}

#[test]
fn test_rpc_devices_skip_the_approval_gate() {
    let matcher = Matcher::new(&AcceptAll, &FixedApproval(ApprovalState::Locked));
    let session = matcher.run(
        vec![DeviceRequirement::single("chamber", "rpc")],
        vec![rpc_device("chamber")],
    );
    assert!(session.was_successful());
}

#[test]
fn test_predicate_rejection_reason_is_surfaced() {
    let policy = FnPolicy(|d: &DeviceDescriptor| -> anyhow::Result<Option<String>> {
        Ok((d.device_name == "34465A").then(|| "reserved for the other bench".to_string()))
    });
    let matcher = Matcher::new(&policy, &APPROVED);
    let session = matcher.run(
        vec![DeviceRequirement::single("dmm", "manual")],
        vec![manual_device("34465A", "SN1")],
    );

    let entry = session.entry("dmm").unwrap();
    assert_eq!(
        entry.candidates()[0].verdict,
        Verdict::Rejected("reserved for the other bench".to_string())
    );
    assert_eq!(entry.state(), MatchState::UnderDefined);
}

#[test]
fn test_predicate_error_becomes_diagnostic() {
    let policy = FnPolicy(|_: &DeviceDescriptor| -> anyhow::Result<Option<String>> {
        anyhow::bail!("script raised")
    });
    let matcher = Matcher::new(&policy, &APPROVED);
    let session = matcher.run(
        vec![DeviceRequirement::single("dmm", "manual")],
        vec![manual_device("34465A", "SN1")],
    );

    let entry = session.entry("dmm").unwrap();
    assert!(matches!(
        &entry.candidates()[0].verdict,
        Verdict::Rejected(reason)
            if reason.contains("acceptance evaluation failed") && reason.contains("script raised")
    ));
}

#[test]
fn test_selecting_rejected_candidate_is_invalid() {
    let policy = FnPolicy(|_: &DeviceDescriptor| -> anyhow::Result<Option<String>> {
        Ok(Some("no".to_string()))
    });
    let matcher = Matcher::new(&policy, &APPROVED);
    let mut session = matcher.run(
        vec![DeviceRequirement::single("dmm", "manual")],
        vec![manual_device("34465A", "SN1")],
    );

    assert!(matches!(
        session.set_selected("dmm", 0, true),
        Err(MatchError::InvalidSelection { .. })
    ));
    assert!(matches!(
        session.set_selected("nope", 0, true),
        Err(MatchError::UnknownAlias(_))
    ));
}

#[test]
fn test_devices_go_to_first_fitting_requirement() {
    let matcher = Matcher::new(&AcceptAll, &APPROVED);
    let session = matcher.run(
        vec![
            DeviceRequirement::single("dmm-a", "manual"),
            DeviceRequirement::single("dmm-b", "manual"),
        ],
        vec![
            manual_device("34465A", "SN1"),
            manual_device("34465A", "SN2"),
        ],
    );

    // One device per requirement: first requirement drains the first fit.
    assert!(session.was_successful());
    let matched = session.into_matched_devices().expect("match failed");
    assert_eq!(matched.len(), 2);
    let aliases: Vec<_> = matched.iter().map(|m| m.alias.as_str()).collect();
    assert_eq!(aliases, vec!["dmm-a", "dmm-b"]);
}

proptest! {
    /// classify() is exactly the window function for all valid windows.
    #[test]
    fn prop_classify_window(min in 0u32..50, extra in 0u32..50, n in 0u32..200) {
        let max = min + extra;
        let req = DeviceRequirement::new("x", "scpi", min, max).expect("valid window");
        let state = classify(&req, n);
        if n < min {
            prop_assert_eq!(state, MatchState::UnderDefined);
        } else if n > max {
            prop_assert_eq!(state, MatchState::OverDefined);
        } else {
            prop_assert_eq!(state, MatchState::FullDefined);
        }
    }

    /// The state recorded on an entry is always recomputable from the
    /// window and the selected count.
    #[test]
    fn prop_entry_state_is_pure_function(n_devices in 0usize..6) {
        let matcher = Matcher::new(&AcceptAll, &APPROVED);
        let devices = (0..n_devices)
            .map(|i| manual_device("34465A", &format!("SN{}", i)))
            .collect();
        let session = matcher.run(
            vec![DeviceRequirement::new("dmm", "manual", 1, 2).expect("valid window")],
            devices,
        );
        let entry = session.entry("dmm").unwrap();
        prop_assert_eq!(
            entry.state(),
            classify(entry.requirement(), entry.selected_count())
        );
    }
}
