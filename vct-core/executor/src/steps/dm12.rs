//! DM12 激活故障码检查
//!
//! 反复全局请求 DM12，直到某个 ECU 报告确认且激活的故障码并点亮 MIL；
//! 之后向每个 OBD ECU 定向请求 DM12，与全局应答比对，并检查未应答的 ECU
//! 是否给出了 NACK。

use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use vct_protocol::{address_name, pgn, AckKind, DiagnosticTroubleCodePacket};
use vct_transport::Packet;

use crate::outcome::{Finding, OutcomeFilter};
use crate::request::{check_nack_completeness, ds_ack_addresses, ds_data_addresses, GlobalResult};
use crate::retry::RetryUntil;
use crate::step::Step;
use crate::{Result, Session};

const NO_ACTIVE_DTC: &str = "6.4.2.2.a";
const NO_MIL_ON: &str = "6.4.2.2.b";
const UNDECODABLE: &str = "6.4.2.2.c";
const DS_DIFFERS: &str = "6.4.2.4.a";
const DS_NOT_NACKED: &str = "6.4.2.4.b";

/// 全局请求中观察到的情况
#[derive(Debug, Default)]
struct Observed {
    active_dtc: bool,
    mil_on: bool,
}

impl Observed {
    /// 累计一轮全局应答，返回无法解码的应答对应的 WARN
    fn update(&mut self, global: &GlobalResult) -> Vec<Finding> {
        let mut findings = Vec::new();
        for packet in &global.packets {
            match DiagnosticTroubleCodePacket::from_packet(packet) {
                Ok(dm12) => {
                    self.active_dtc |= dm12.has_dtcs();
                    self.mil_on |= dm12.mil_status.is_on();
                }
                Err(e) => {
                    warn!("{} 的 DM12 无法解码: {}", address_name(packet.source), e);
                    findings.push(Finding::warn(
                        UNDECODABLE,
                        format!("{} provided a malformed DM12", address_name(packet.source)),
                    ));
                }
            }
        }
        findings
    }

    fn satisfied(&self) -> bool {
        self.active_dtc && self.mil_on
    }
}

/// DM12 激活故障码步骤
#[derive(Debug, Default)]
pub struct Dm12ActiveDtcStep;

impl Dm12ActiveDtcStep {
    pub fn new() -> Self {
        Self
    }

    fn unmet(observed: &Observed, operator_stopped: bool) -> Vec<Finding> {
        let mut findings = Vec::new();
        if !observed.active_dtc {
            let message = if operator_stopped {
                "User said 'no' and no ECU reported a confirmed and active DTC"
            } else {
                "No ECU reported a confirmed and active DTC"
            };
            findings.push(Finding::fail(NO_ACTIVE_DTC, message));
        }
        if !observed.mil_on {
            findings.push(Finding::fail(NO_MIL_ON, "No ECU reported MIL on"));
        }
        findings
    }

    /// 定向应答与全局应答比对
    fn compare(global: &GlobalResult, address: u8, ds: &Packet) -> Option<Finding> {
        let same = global
            .packet_from(address)
            .and_then(|g| DiagnosticTroubleCodePacket::from_packet(g).ok())
            .zip(DiagnosticTroubleCodePacket::from_packet(ds).ok())
            .map(|(g, d)| g.same_content(&d))
            .unwrap_or(false);

        (!same).then(|| {
            Finding::fail(
                DS_DIFFERS,
                format!(
                    "Difference compared to data received during global request from {}",
                    address_name(address)
                ),
            )
        })
    }
}

#[async_trait]
impl Step for Dm12ActiveDtcStep {
    fn description(&self) -> &str {
        "Request DM12 until an ECU reports a confirmed and active DTC"
    }

    async fn run(&self, session: &mut Session) -> Result<()> {
        let part = session.part();
        let label = format!("Part {}, Step {} DM12 request", part, session.step());
        let mut retry = RetryUntil::new(
            session.retry_policy(),
            label,
            "No ECU has reported a confirmed and active DTC.\nDo you wish to continue?",
        );

        let mut observed = Observed::default();
        let mut malformed = OutcomeFilter::new();
        let mut global = GlobalResult::default();
        while let Some(attempt) = retry.next_attempt(session).await? {
            global = session.request_global(pgn::DM12).await?;
            for finding in observed.update(&global) {
                session.report_once(&mut malformed, finding);
            }
            debug!(
                "DM12 第 {} 次: 故障码 {}, MIL {}",
                attempt, observed.active_dtc, observed.mil_on
            );
            if observed.satisfied() {
                retry.satisfy();
            }
        }
        retry.finish(session, |outcome| {
            Self::unmet(&observed, outcome.operator_stopped)
        });

        for packet in &global.packets {
            session.repository_mut().save(packet.clone(), part);
        }

        let obd: Vec<u8> = session
            .repository()
            .obd_module_addresses()
            .into_iter()
            .collect();
        let results = session.request_ds_each(pgn::DM12, &obd).await?;

        for (address, result) in &results {
            if let Some(packet) = result.packet() {
                if let Some(finding) = Self::compare(&global, *address, packet) {
                    session.report(finding);
                }
                session.repository_mut().save(packet.clone(), part);
            }
        }

        let expected: BTreeSet<u8> = obd.iter().copied().collect();
        let data: BTreeSet<u8> = global
            .data_addresses()
            .union(&ds_data_addresses(&results))
            .copied()
            .collect();
        let acks = ds_ack_addresses(&results, &[AckKind::Nack]);
        session.report_all(check_nack_completeness(
            &expected,
            &data,
            &acks,
            DS_NOT_NACKED,
        ));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vct_protocol::{DiagnosticTroubleCode, LampStatus};

    fn dm12(source: u8, mil: LampStatus, dtcs: &[DiagnosticTroubleCode]) -> Packet {
        DiagnosticTroubleCodePacket::encode(pgn::DM12, source, mil, dtcs)
    }

    #[test]
    fn test_observed_requires_dtc_and_mil() {
        let dtc = DiagnosticTroubleCode::new(102, 2, 1);
        let mut observed = Observed::default();

        let findings = observed.update(&GlobalResult {
            pgn: pgn::DM12,
            packets: vec![dm12(0, LampStatus::Off, &[dtc])],
            acks: vec![],
        });
        assert!(findings.is_empty());
        assert!(observed.active_dtc);
        assert!(!observed.satisfied());

        observed.update(&GlobalResult {
            pgn: pgn::DM12,
            packets: vec![dm12(1, LampStatus::On, &[])],
            acks: vec![],
        });
        assert!(observed.satisfied());
    }

    #[test]
    fn test_truncated_dm12_is_warned() {
        let mut observed = Observed::default();
        let findings = observed.update(&GlobalResult {
            pgn: pgn::DM12,
            packets: vec![Packet::new(pgn::DM12, 0x03, vec![0x40])],
            acks: vec![],
        });

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, "6.4.2.2.c");
        assert!(!observed.active_dtc);
    }

    #[test]
    fn test_unmet_messages() {
        let observed = Observed::default();

        let stopped = Dm12ActiveDtcStep::unmet(&observed, true);
        assert_eq!(stopped.len(), 2);
        assert_eq!(
            stopped[0].message,
            "User said 'no' and no ECU reported a confirmed and active DTC"
        );
        assert_eq!(stopped[1].rule_id, "6.4.2.2.b");

        let exhausted = Dm12ActiveDtcStep::unmet(&observed, false);
        assert_eq!(exhausted[0].message, "No ECU reported a confirmed and active DTC");
    }

    #[test]
    fn test_compare_flags_difference() {
        let dtc = DiagnosticTroubleCode::new(102, 2, 1);
        let global = GlobalResult {
            pgn: pgn::DM12,
            packets: vec![dm12(1, LampStatus::On, &[dtc])],
            acks: vec![],
        };

        assert!(Dm12ActiveDtcStep::compare(&global, 1, &dm12(1, LampStatus::On, &[dtc])).is_none());

        let finding = Dm12ActiveDtcStep::compare(&global, 1, &dm12(1, LampStatus::Off, &[dtc]));
        assert_eq!(finding.unwrap().rule_id, "6.4.2.4.a");

        assert!(Dm12ActiveDtcStep::compare(&global, 0, &dm12(0, LampStatus::Off, &[])).is_some());
    }
}
