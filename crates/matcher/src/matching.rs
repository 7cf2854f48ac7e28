//! The matching algorithm and resolution session
//!
//! A match runs in phases: candidate filtering per requirement, the
//! calibration-approval gate, acceptance-predicate evaluation, and
//! quantity-window classification. Over-defined requirements default every
//! accepted candidate to selected and wait for an external resolution to
//! reduce the set; under-defined requirements are a hard failure. Each run
//! starts from this default; prior selections do not persist.

use crate::candidate::{AcceptancePolicy, CandidateDevice, DeviceDescriptor, Verdict};
use crate::error::{MatchError, Result};
use crate::protocol::Protocol;
use crate::requirement::{DeviceRequirement, MatchState, classify};
use common::approval::CalibrationLookup;
use tracing::{debug, info, warn};

/// A live device offered to the matcher
#[derive(Debug)]
pub struct AvailableDevice {
    pub descriptor: DeviceDescriptor,
    /// The protocol instance, transport inside
    pub protocol: Protocol,
    /// Already allocated elsewhere; never offered as a candidate
    pub in_use: bool,
}

impl AvailableDevice {
    pub fn new(descriptor: DeviceDescriptor, protocol: Protocol) -> Self {
        Self {
            descriptor,
            protocol,
            in_use: false,
        }
    }
}

/// One requirement plus its candidates and derived state
#[derive(Debug)]
pub struct MatchEntry {
    requirement: DeviceRequirement,
    candidates: Vec<CandidateDevice>,
    state: MatchState,
}

impl MatchEntry {
    pub fn requirement(&self) -> &DeviceRequirement {
        &self.requirement
    }

    pub fn candidates(&self) -> &[CandidateDevice] {
        &self.candidates
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn selected_count(&self) -> u32 {
        self.candidates.iter().filter(|c| c.selected).count() as u32
    }

    pub fn accepted_count(&self) -> u32 {
        self.candidates
            .iter()
            .filter(|c| c.verdict.is_accepted())
            .count() as u32
    }

    fn reclassify(&mut self) {
        self.state = classify(&self.requirement, self.selected_count());
    }
}

/// A matched device handed back to the test program
#[derive(Debug)]
pub struct MatchedDevice {
    /// The requirement alias this device fills
    pub alias: String,
    pub descriptor: DeviceDescriptor,
    /// The protocol instance, transport inside
    pub protocol: Protocol,
}

/// The matching engine
///
/// Holds the two collaborator boundaries: the calibration-approval lookup
/// and the acceptance predicate.
pub struct Matcher<'a> {
    acceptance: &'a dyn AcceptancePolicy,
    approval: &'a dyn CalibrationLookup,
}

impl<'a> Matcher<'a> {
    pub fn new(acceptance: &'a dyn AcceptancePolicy, approval: &'a dyn CalibrationLookup) -> Self {
        Self {
            acceptance,
            approval,
        }
    }

    /// Run a match of `devices` against `requirements`
    ///
    /// Devices are offered to requirements in declaration order; a device
    /// fitting several requirements becomes a candidate of the first one it
    /// fits. Evaluation of distinct candidates is independent; selection
    /// state only changes through the returned session.
    pub fn run(
        &self,
        requirements: Vec<DeviceRequirement>,
        devices: Vec<AvailableDevice>,
    ) -> MatchSession {
        let mut pool: Vec<Option<AvailableDevice>> = devices
            .into_iter()
            .map(|d| if d.in_use { None } else { Some(d) })
            .collect();

        let mut entries = Vec::with_capacity(requirements.len());
        for requirement in requirements {
            let mut candidates = Vec::new();
            for slot in pool.iter_mut() {
                let fits = slot.as_ref().is_some_and(|device| {
                    device.protocol.kind_name() == requirement.protocol_name
                        && requirement.accepts_name(&device.descriptor.device_name)
                });
                if !fits {
                    continue;
                }
                let device = slot.take().expect("slot checked above");
                candidates.push(self.evaluate(&requirement, device));
            }

            let mut entry = MatchEntry {
                state: classify(&requirement, 0),
                requirement,
                candidates,
            };

            // Select every accepted candidate; over-definition is resolved
            // externally, under-definition cannot be.
            for candidate in entry.candidates.iter_mut() {
                candidate.selected = candidate.verdict.is_accepted();
            }
            entry.reclassify();
            match entry.state {
                MatchState::UnderDefined => warn!(
                    alias = %entry.requirement.alias,
                    found = entry.accepted_count(),
                    needed = entry.requirement.quantity_min(),
                    "requirement under-defined"
                ),
                MatchState::OverDefined => info!(
                    alias = %entry.requirement.alias,
                    selected = entry.selected_count(),
                    "requirement over-defined, awaiting resolution"
                ),
                MatchState::FullDefined => debug!(
                    alias = %entry.requirement.alias,
                    selected = entry.selected_count(),
                    "requirement satisfied"
                ),
            }
            entries.push(entry);
        }

        MatchSession { entries }
    }

    /// Gate and judge one candidate
    fn evaluate(
        &self,
        requirement: &DeviceRequirement,
        device: AvailableDevice,
    ) -> CandidateDevice {
        let descriptor = device.descriptor;
        let verdict = self.judge(&descriptor, device.protocol.needs_approval());
        if let Verdict::Rejected(reason) = &verdict {
            debug!(
                alias = %requirement.alias,
                device = %descriptor.device_name,
                reason = %reason,
                "candidate rejected"
            );
        }
        CandidateDevice {
            descriptor,
            protocol: device.protocol,
            selected: false,
            verdict,
        }
    }

    fn judge(&self, descriptor: &DeviceDescriptor, needs_approval: bool) -> Verdict {
        // Approval gate runs before the acceptance predicate ever sees the
        // device.
        if needs_approval {
            let Some(identity) = &descriptor.identity else {
                return Verdict::Rejected("no identity for approval lookup".to_string());
            };
            let verdict = self.approval.approval(identity, &descriptor.device_name);
            if !verdict.state.is_usable() {
                return Verdict::Rejected(format!(
                    "calibration {}: {}",
                    verdict.state, verdict.summary
                ));
            }
        }

        match self.acceptance.evaluate(descriptor) {
            Ok(None) => Verdict::Accepted,
            Ok(Some(reason)) => Verdict::Rejected(reason),
            // Predicate failures surface as diagnostics, never crash the
            // match.
            Err(e) => Verdict::Rejected(format!("acceptance evaluation failed: {e:#}")),
        }
    }
}

/// Result of a match run plus the resolution interface
///
/// The human-resolution collaborator receives the entries (aliases,
/// candidates, verdicts, selection flags) and feeds updated selections back
/// through [`MatchSession::set_selected`]. Selection mutation is serialized
/// through `&mut self`.
#[derive(Debug)]
pub struct MatchSession {
    entries: Vec<MatchEntry>,
}

impl MatchSession {
    pub fn entries(&self) -> &[MatchEntry] {
        &self.entries
    }

    pub fn entry(&self, alias: &str) -> Option<&MatchEntry> {
        self.entries.iter().find(|e| e.requirement.alias == alias)
    }

    /// Entries still needing attention (over- or under-defined)
    pub fn unresolved(&self) -> impl Iterator<Item = &MatchEntry> {
        self.entries
            .iter()
            .filter(|e| e.state != MatchState::FullDefined)
    }

    /// True iff every requirement is fully defined
    pub fn was_successful(&self) -> bool {
        self.entries
            .iter()
            .all(|e| e.state == MatchState::FullDefined)
    }

    /// Update one candidate's selection flag
    ///
    /// Only accepted candidates are selectable. For single-quantity
    /// requirements, selecting a candidate deselects all others of that
    /// requirement. States are reclassified afterwards.
    pub fn set_selected(&mut self, alias: &str, index: usize, selected: bool) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.requirement.alias == alias)
            .ok_or_else(|| MatchError::UnknownAlias(alias.to_string()))?;

        let candidate =
            entry
                .candidates
                .get(index)
                .ok_or_else(|| MatchError::InvalidSelection {
                    alias: alias.to_string(),
                    reason: format!("no candidate at index {}", index),
                })?;
        if selected && !candidate.verdict.is_accepted() {
            return Err(MatchError::InvalidSelection {
                alias: alias.to_string(),
                reason: format!("candidate {} was rejected", index),
            });
        }

        let exclusive = selected && entry.requirement.quantity_max() == 1;
        for (i, candidate) in entry.candidates.iter_mut().enumerate() {
            if i == index {
                candidate.selected = selected;
            } else if exclusive {
                candidate.selected = false;
            }
        }
        entry.reclassify();
        Ok(())
    }

    /// Consume the session, yielding the device of every selected candidate
    ///
    /// Fails with the first under-defined or still-ambiguous requirement;
    /// the error names the requirement and the counts involved.
    pub fn into_matched_devices(self) -> Result<Vec<MatchedDevice>> {
        for entry in &self.entries {
            match entry.state {
                MatchState::UnderDefined => {
                    return Err(MatchError::UnderDefinedRequirement {
                        alias: entry.requirement.alias.clone(),
                        found: entry.accepted_count(),
                        needed: entry.requirement.quantity_min(),
                    });
                }
                MatchState::OverDefined => {
                    return Err(MatchError::AmbiguousRequirement {
                        alias: entry.requirement.alias.clone(),
                        selected: entry.selected_count(),
                        max: entry.requirement.quantity_max(),
                    });
                }
                MatchState::FullDefined => {}
            }
        }

        let mut matched = Vec::new();
        for entry in self.entries {
            let alias = entry.requirement.alias;
            for candidate in entry.candidates {
                if candidate.selected {
                    matched.push(MatchedDevice {
                        alias: alias.clone(),
                        descriptor: candidate.descriptor,
                        protocol: candidate.protocol,
                    });
                }
            }
        }
        Ok(matched)
    }
}
