// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use vanguard_core::application::tool_gateway::approval_key;
use vanguard_core::cost::CostLedger;
use vanguard_core::domain::events::SessionEvent;
use vanguard_core::domain::memory::{MemoryCategory, MemoryFilter, MemoryStore};
use vanguard_core::domain::session::{AgentRole, ForcedSummaryReason, SessionId, SessionStatus};
use vanguard_core::domain::tool::{
    ApprovalOutcome, RiskTier, ToolCallId, ToolCallRequest, ToolCallStatus,
};
use vanguard_swarm::{SwarmError, TurnOutcome};

fn nmap() -> ToolCallRequest {
    ToolCallRequest::new("nmap")
        .with_argument("target", "192.168.1.100")
        .with_argument("flags", "-sV")
}

fn exploit() -> ToolCallRequest {
    ToolCallRequest::new("exploit_ms17_010")
        .with_argument("target", "192.168.1.100")
        .with_declared_risk(RiskTier::High)
}

#[tokio::test]
async fn test_recon_scan_flows_into_budget_forced_summary() {
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::Recon))
        .on(AgentRole::Recon, tool_call(nmap()))
        .on(AgentRole::Recon, handoff(AgentRole::Planner))
        .on(AgentRole::Summary, report("One host, SSH exposed."));
    let tools = ScriptedTools::new(vec![ToolStep::Ok(json!({
        "raw": "22/tcp open ssh OpenSSH 8.9p1",
        "facts": [
            {"category": "service", "key": "192.168.1.100:22/tcp", "content": "OpenSSH 8.9p1"}
        ]
    }))]);
    let h = harness(backend.clone(), tools.clone(), coordinator_config(3));
    let c = &h.coordinator;

    let id = c
        .start_session("Scan 192.168.1.100 for vulnerabilities")
        .await
        .unwrap();
    let session = c.session(id).await.unwrap();
    assert_eq!(session.active_role, AgentRole::Planner);
    assert_eq!(session.status, SessionStatus::Running);
    assert!(session.last_checkpoint_at.is_some());

    assert_eq!(
        c.advance(id).await.unwrap(),
        TurnOutcome::HandedOff {
            seq: 1,
            from: AgentRole::Planner,
            to: AgentRole::Recon
        }
    );

    match c.advance(id).await.unwrap() {
        TurnOutcome::ToolExecuted { seq, result } => {
            assert_eq!(seq, 2);
            assert_eq!(result.status, ToolCallStatus::Ok);
            assert_eq!(result.tier, RiskTier::Low);
        }
        other => panic!("expected tool execution, got {:?}", other),
    }
    assert_eq!(tools.invocations().len(), 1);
    assert!(h.approvals.decisions(id).is_empty());

    let services = h
        .memory
        .query(id, MemoryCategory::Service, &MemoryFilter::all())
        .await
        .unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].key, "192.168.1.100:22/tcp");
    assert_eq!(services[0].source_turn, 2);

    assert!(matches!(
        c.advance(id).await.unwrap(),
        TurnOutcome::HandedOff { to: AgentRole::Planner, .. }
    ));

    // Budget of three turns is spent; Planner never gets another turn.
    match c.advance(id).await.unwrap() {
        TurnOutcome::Completed { seq, report, forced } => {
            assert_eq!(seq, 4);
            assert_eq!(report, "One host, SSH exposed.");
            assert_eq!(forced, Some(ForcedSummaryReason::BudgetExhausted));
        }
        other => panic!("expected completion, got {:?}", other),
    }

    let session = c.session(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.turn_count, 4);
    assert_eq!(session.report.as_deref(), Some("One host, SSH exposed."));

    let summary_ctx = backend.last_context(AgentRole::Summary).unwrap();
    assert_eq!(summary_ctx.forced_summary, Some(ForcedSummaryReason::BudgetExhausted));
    assert!(summary_ctx
        .memory
        .iter()
        .any(|r| r.category == MemoryCategory::Service));

    let seqs: Vec<u64> = c.turns(id).await.unwrap().iter().map(|t| t.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_denied_exploit_is_rejected_and_visible_to_init_access() {
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::InitAccess))
        .on(AgentRole::InitAccess, tool_call(exploit()))
        .on(AgentRole::InitAccess, handoff(AgentRole::Summary))
        .on(AgentRole::Summary, report("Exploitation was not authorised."));
    let tools = ScriptedTools::new(vec![]);
    let h = harness(backend.clone(), tools.clone(), coordinator_config(40));
    let c = &h.coordinator;

    let id = c.start_session("Assess 192.168.1.100").await.unwrap();
    c.advance(id).await.unwrap();

    let tool_call_id = match c.advance(id).await.unwrap() {
        TurnOutcome::AwaitingApproval {
            seq,
            tool_call_id,
            tier,
            ..
        } => {
            assert_eq!(seq, 2);
            assert_eq!(tier, RiskTier::High);
            tool_call_id
        }
        other => panic!("expected approval gate, got {:?}", other),
    };
    assert_eq!(c.session(id).await.unwrap().status, SessionStatus::AwaitingApproval);
    assert_eq!(c.pending_approvals().len(), 1);

    for _ in 0..2 {
        assert!(matches!(
            c.advance(id).await,
            Err(SwarmError::SessionBlocked { tool_call_id: blocked, .. }) if blocked == tool_call_id
        ));
    }

    let result = c
        .submit_approval(tool_call_id, ApprovalOutcome::Denied, "operator")
        .await
        .unwrap();
    assert_eq!(result.status, ToolCallStatus::Rejected);
    assert!(tools.invocations().is_empty());

    let session = c.session(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Running);
    assert_eq!(session.active_role, AgentRole::InitAccess);
    assert!(session.pending_approval.is_none());

    assert!(matches!(
        c.submit_approval(tool_call_id, ApprovalOutcome::Approved, "operator").await,
        Err(SwarmError::NoPendingApproval(_))
    ));

    assert!(matches!(
        c.advance(id).await.unwrap(),
        TurnOutcome::HandedOff { seq: 3, to: AgentRole::Summary, .. }
    ));
    let seen = backend.last_context(AgentRole::InitAccess).unwrap();
    let last = seen.last_tool_result.expect("rejected result in context");
    assert_eq!(last.tool_call_id, tool_call_id);
    assert_eq!(last.status, ToolCallStatus::Rejected);

    assert!(matches!(c.advance(id).await.unwrap(), TurnOutcome::Completed { .. }));
}

#[tokio::test]
async fn test_gated_results_always_follow_an_approval() {
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::Recon))
        .on(AgentRole::Recon, tool_call(nmap()))
        .on(
            AgentRole::Recon,
            tool_call(ToolCallRequest::new("nuclei").with_argument("target", "192.168.1.100")),
        );
    let tools = ScriptedTools::new(vec![
        ToolStep::Ok(json!("22/tcp open")),
        ToolStep::Ok(json!({"facts": [{"category": "finding", "key": "CVE-2023-38408", "content": "ssh-agent RCE"}]})),
    ]);
    let h = harness(backend, tools.clone(), coordinator_config(40));
    let mut events = h.coordinator.subscribe();
    let c = &h.coordinator;

    let id = c.start_session("Scan 192.168.1.100").await.unwrap();
    c.advance(id).await.unwrap();
    c.advance(id).await.unwrap();
    let TurnOutcome::AwaitingApproval { tool_call_id, tier, .. } = c.advance(id).await.unwrap() else {
        panic!("nuclei should be gated");
    };
    assert_eq!(tier, RiskTier::Medium);
    assert_eq!(tools.invocations().len(), 1);

    let result = c
        .submit_approval(tool_call_id, ApprovalOutcome::Approved, "operator")
        .await
        .unwrap();
    assert_eq!(result.status, ToolCallStatus::Ok);
    assert_eq!(result.requesting_turn, 3);
    assert_eq!(tools.invocations().len(), 2);

    let mut completed = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::ToolCallCompleted {
            tool_call_id, tier, status, ..
        } = event
        {
            completed.push((tool_call_id, tier, status));
        }
    }
    assert_eq!(completed.len(), 2);
    for (tool_call_id, tier, status) in completed {
        if tier.requires_approval() && status != ToolCallStatus::Rejected {
            let approvals = h
                .memory
                .query(id, MemoryCategory::Note, &MemoryFilter::all().key(approval_key(tool_call_id)))
                .await
                .unwrap();
            assert_eq!(approvals.len(), 1);
            assert!(approvals[0].content.starts_with("approved nuclei"));
            assert!(approvals[0].content.contains("by operator"));
        }
    }
}

#[tokio::test]
async fn test_tool_timeouts_become_error_result() {
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::Recon))
        .on(AgentRole::Recon, tool_call(nmap()));
    let tools = ScriptedTools::new(vec![ToolStep::Hang, ToolStep::Hang, ToolStep::Hang]);
    let h = harness(backend, tools.clone(), coordinator_config(40));
    let c = &h.coordinator;

    let id = c.start_session("Scan 192.168.1.100").await.unwrap();
    c.advance(id).await.unwrap();
    match c.advance(id).await.unwrap() {
        TurnOutcome::ToolExecuted { result, .. } => {
            assert_eq!(result.status, ToolCallStatus::Error);
            assert_eq!(result.retry_count, 2);
        }
        other => panic!("expected error result, got {:?}", other),
    }
    assert_eq!(tools.invocations().len(), 3);

    let session = c.session(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Running);
    assert_eq!(session.active_role, AgentRole::Recon);

    let notes = h
        .memory
        .query(id, MemoryCategory::Note, &MemoryFilter::all())
        .await
        .unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(h.ledger.total(id).await.tool_calls, 1);
}

#[tokio::test]
async fn test_transport_failure_recovers_on_retry() {
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::Recon))
        .on(AgentRole::Recon, tool_call(nmap()));
    let tools = ScriptedTools::new(vec![
        ToolStep::Fail("connection refused".to_string()),
        ToolStep::Ok(json!("80/tcp open")),
    ]);
    let h = harness(backend, tools, coordinator_config(40));
    let id = h.coordinator.start_session("Scan").await.unwrap();
    h.coordinator.advance(id).await.unwrap();
    let TurnOutcome::ToolExecuted { result, .. } = h.coordinator.advance(id).await.unwrap() else {
        panic!("expected tool result");
    };
    assert_eq!(result.status, ToolCallStatus::Ok);
    assert_eq!(result.retry_count, 1);
}

#[tokio::test]
async fn test_resume_reproduces_role_and_turn_count() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::Recon))
        .on(AgentRole::Recon, tool_call(nmap()))
        .on(AgentRole::Recon, handoff(AgentRole::InitAccess));
    let tools = ScriptedTools::new(vec![ToolStep::Ok(json!("22/tcp open"))]);

    let (id, before) = {
        let h = harness_on_disk(backend, tools, coordinator_config(40), dir.path());
        let id = h.coordinator.start_session("Scan 192.168.1.100").await.unwrap();
        for _ in 0..3 {
            h.coordinator.advance(id).await.unwrap();
        }
        (id, h.coordinator.session(id).await.unwrap())
    };
    assert_eq!(before.active_role, AgentRole::InitAccess);
    assert_eq!(before.turn_count, 3);

    // Fresh process: nothing loaded until resume.
    let backend = ScriptedBackend::new().on(AgentRole::InitAccess, handoff(AgentRole::Planner));
    let h = harness_on_disk(backend.clone(), ScriptedTools::new(vec![]), coordinator_config(40), dir.path());
    assert!(matches!(
        h.coordinator.advance(id).await,
        Err(SwarmError::SessionNotFound(_))
    ));

    let resumed = h.coordinator.resume_session(id).await.unwrap();
    assert_eq!(resumed.active_role, before.active_role);
    assert_eq!(resumed.turn_count, before.turn_count);
    assert_eq!(resumed.status, SessionStatus::Running);
    assert_eq!(h.coordinator.turns(id).await.unwrap().len(), 3);

    assert!(matches!(
        h.coordinator.advance(id).await.unwrap(),
        TurnOutcome::HandedOff { seq: 4, .. }
    ));
    let ctx = backend.last_context(AgentRole::InitAccess).unwrap();
    assert_eq!(ctx.recent_turns.last().map(|t| t.seq), Some(3));
}

#[tokio::test]
async fn test_resume_restores_pending_approval() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::InitAccess))
        .on(AgentRole::InitAccess, tool_call(exploit()));

    let (id, tool_call_id) = {
        let h = harness_on_disk(backend, ScriptedTools::new(vec![]), coordinator_config(40), dir.path());
        let id = h.coordinator.start_session("Assess 192.168.1.100").await.unwrap();
        h.coordinator.advance(id).await.unwrap();
        let TurnOutcome::AwaitingApproval { tool_call_id, .. } = h.coordinator.advance(id).await.unwrap() else {
            panic!("expected approval gate");
        };
        (id, tool_call_id)
    };

    let h = harness_on_disk(
        ScriptedBackend::new(),
        ScriptedTools::new(vec![]),
        coordinator_config(40),
        dir.path(),
    );
    let resumed = h.coordinator.resume_session(id).await.unwrap();
    assert_eq!(resumed.status, SessionStatus::AwaitingApproval);
    assert_eq!(resumed.active_role, AgentRole::InitAccess);
    assert_eq!(h.coordinator.pending_approvals()[0].tool_call_id(), tool_call_id);
    assert!(matches!(
        h.coordinator.advance(id).await,
        Err(SwarmError::SessionBlocked { .. })
    ));

    let result = h
        .coordinator
        .submit_approval(tool_call_id, ApprovalOutcome::Denied, "operator")
        .await
        .unwrap();
    assert_eq!(result.status, ToolCallStatus::Rejected);
}

#[tokio::test]
async fn test_failed_result_write_after_approval_fails_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::InitAccess))
        .on(
            AgentRole::InitAccess,
            tool_call(ToolCallRequest::new("hydra").with_argument("target", "192.168.1.100")),
        );
    let tools = ScriptedTools::new(vec![ToolStep::Ok(json!("admin:admin"))]);
    let h = harness_on_disk(backend, tools.clone(), coordinator_config(40), dir.path());
    let c = &h.coordinator;

    let id = c.start_session("Assess 192.168.1.100").await.unwrap();
    c.advance(id).await.unwrap();
    let TurnOutcome::AwaitingApproval { tool_call_id, .. } = c.advance(id).await.unwrap() else {
        panic!("hydra should be gated");
    };

    // The decision note lands; the tool result write does not.
    h.memory.fail_after(1);
    assert!(matches!(
        c.submit_approval(tool_call_id, ApprovalOutcome::Approved, "operator").await,
        Err(SwarmError::Internal(reason)) if reason.contains("disk full")
    ));
    assert_eq!(tools.invocations().len(), 1);

    let session = c.session(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert!(session.pending_approval.is_none());
    assert!(session.failure_reason.as_deref().unwrap().contains("disk full"));
    assert!(c.pending_approvals().is_empty());
    assert!(matches!(
        c.advance(id).await,
        Err(SwarmError::SessionTerminal { status: SessionStatus::Failed, .. })
    ));
    assert!(matches!(
        c.submit_approval(tool_call_id, ApprovalOutcome::Approved, "operator").await,
        Err(SwarmError::NoPendingApproval(_))
    ));

    // A restart must not re-park the call that already ran.
    let h = harness_on_disk(ScriptedBackend::new(), tools.clone(), coordinator_config(40), dir.path());
    let resumed = h.coordinator.resume_session(id).await.unwrap();
    assert_eq!(resumed.status, SessionStatus::Failed);
    assert!(resumed.pending_approval.is_none());
    assert!(h.coordinator.pending_approvals().is_empty());
    assert_eq!(tools.invocations().len(), 1);
}

#[tokio::test]
async fn test_failed_decision_write_fails_the_session_before_dispatch() {
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::InitAccess))
        .on(AgentRole::InitAccess, tool_call(exploit()));
    let tools = ScriptedTools::new(vec![ToolStep::Ok(json!("shell opened"))]);
    let h = harness(backend, tools.clone(), coordinator_config(40));
    let c = &h.coordinator;

    let id = c.start_session("Assess 192.168.1.100").await.unwrap();
    c.advance(id).await.unwrap();
    let TurnOutcome::AwaitingApproval { tool_call_id, .. } = c.advance(id).await.unwrap() else {
        panic!("exploit should be gated");
    };

    h.memory.fail_after(0);
    assert!(c
        .submit_approval(tool_call_id, ApprovalOutcome::Approved, "operator")
        .await
        .is_err());
    assert!(tools.invocations().is_empty());
    assert_eq!(c.session(id).await.unwrap().status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_terminal_session_rejects_advance_repeatedly() {
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::Summary))
        .on(AgentRole::Summary, report("Nothing to do."));
    let h = harness(backend.clone(), ScriptedTools::new(vec![]), coordinator_config(40));
    let c = &h.coordinator;

    let id = c.start_session("Scan").await.unwrap();
    c.advance(id).await.unwrap();
    assert!(matches!(c.advance(id).await.unwrap(), TurnOutcome::Completed { forced: None, .. }));
    let calls = backend.contexts().len();

    for _ in 0..3 {
        assert!(matches!(
            c.advance(id).await,
            Err(SwarmError::SessionTerminal { status: SessionStatus::Completed, .. })
        ));
    }
    assert_eq!(backend.contexts().len(), calls);
    assert_eq!(c.turns(id).await.unwrap().len(), 2);

    // Cancelling an ended session changes nothing.
    c.cancel_session(id).await.unwrap();
    assert_eq!(c.session(id).await.unwrap().status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_backend_outage_fails_session_with_audit_note() {
    let backend = ScriptedBackend::new();
    let h = harness(backend, ScriptedTools::new(vec![]), coordinator_config(40));
    let c = &h.coordinator;

    let id = c.start_session("Scan").await.unwrap();
    assert!(matches!(c.advance(id).await.unwrap(), TurnOutcome::Failed { .. }));

    let session = c.session(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert!(session.failure_reason.is_some());
    assert_eq!(session.turn_count, 0);

    let notes = h
        .memory
        .query(id, MemoryCategory::Note, &MemoryFilter::all().key("coordinator:failed"))
        .await
        .unwrap();
    assert_eq!(notes.len(), 1);
    assert!(matches!(c.advance(id).await, Err(SwarmError::SessionTerminal { .. })));
}

#[tokio::test]
async fn test_cancel_is_idempotent_and_discards_pending_approval() {
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::InitAccess))
        .on(AgentRole::InitAccess, tool_call(exploit()));
    let h = harness(backend, ScriptedTools::new(vec![]), coordinator_config(40));
    let c = &h.coordinator;

    let id = c.start_session("Assess").await.unwrap();
    c.advance(id).await.unwrap();
    let TurnOutcome::AwaitingApproval { tool_call_id, .. } = c.advance(id).await.unwrap() else {
        panic!("expected approval gate");
    };

    c.cancel_session(id).await.unwrap();
    c.cancel_session(id).await.unwrap();

    let session = c.session(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert!(session.pending_approval.is_none());
    assert!(c.pending_approvals().is_empty());
    assert!(matches!(
        c.submit_approval(tool_call_id, ApprovalOutcome::Approved, "operator").await,
        Err(SwarmError::NoPendingApproval(_))
    ));
    assert!(matches!(
        c.advance(id).await,
        Err(SwarmError::SessionTerminal { status: SessionStatus::Cancelled, .. })
    ));
}

#[tokio::test]
async fn test_cancel_abandons_in_flight_tool_call() {
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::Recon))
        .on(AgentRole::Recon, tool_call(nmap()));
    let tools = ScriptedTools::new(vec![ToolStep::Hang, ToolStep::Hang, ToolStep::Hang]);
    let h = harness(backend, tools, coordinator_config(40));
    let coordinator = Arc::new(h.coordinator);

    let id = coordinator.start_session("Scan").await.unwrap();
    coordinator.advance(id).await.unwrap();

    let runner = coordinator.clone();
    let turn = tokio::spawn(async move { runner.advance(id).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    coordinator.cancel_session(id).await.unwrap();

    assert_eq!(turn.await.unwrap().unwrap(), TurnOutcome::Cancelled);
    let session = coordinator.session(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert_eq!(
        session.last_tool_result.map(|r| r.status),
        Some(ToolCallStatus::Cancelled)
    );
    assert_eq!(coordinator.turns(id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_disallowed_actions_are_noted_and_role_stays() {
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::Recon))
        .on(AgentRole::Recon, handoff(AgentRole::Summary))
        .on(AgentRole::Recon, report("premature"))
        .on(AgentRole::Recon, handoff(AgentRole::Planner));
    let h = harness(backend, ScriptedTools::new(vec![]), coordinator_config(40));
    let c = &h.coordinator;

    let id = c.start_session("Scan").await.unwrap();
    c.advance(id).await.unwrap();

    assert!(matches!(
        c.advance(id).await.unwrap(),
        TurnOutcome::ActionRejected { seq: 2, role: AgentRole::Recon, .. }
    ));
    assert!(matches!(
        c.advance(id).await.unwrap(),
        TurnOutcome::ActionRejected { seq: 3, .. }
    ));
    assert_eq!(c.session(id).await.unwrap().active_role, AgentRole::Recon);
    assert!(matches!(
        c.advance(id).await.unwrap(),
        TurnOutcome::HandedOff { seq: 4, to: AgentRole::Planner, .. }
    ));

    let turns = c.turns(id).await.unwrap();
    assert!(turns[1].note.as_deref().unwrap().contains("not allowed"));
    assert!(turns[2].note.is_some());
    assert!(turns[3].note.is_none());

    let notes = h
        .memory
        .query(id, MemoryCategory::Note, &MemoryFilter::all())
        .await
        .unwrap();
    assert_eq!(notes.len(), 2);
}

#[tokio::test]
async fn test_summary_without_report_gets_synthesized_one() {
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::Recon))
        .on(AgentRole::Recon, tool_call(nmap()))
        .on(AgentRole::Recon, handoff(AgentRole::Planner))
        .on(AgentRole::Planner, handoff(AgentRole::Summary))
        .on(AgentRole::Summary, handoff(AgentRole::Planner));
    let tools = ScriptedTools::new(vec![ToolStep::Ok(json!({
        "facts": [{"category": "host", "key": "192.168.1.100", "content": "Ubuntu 22.04"}]
    }))]);
    let h = harness(backend, tools, coordinator_config(40));
    let c = &h.coordinator;

    let id = c.start_session("Scan 192.168.1.100").await.unwrap();
    for _ in 0..4 {
        c.advance(id).await.unwrap();
    }
    let TurnOutcome::Completed { report, .. } = c.advance(id).await.unwrap() else {
        panic!("summary must complete the session");
    };
    assert!(report.contains("192.168.1.100: Ubuntu 22.04"));

    let turns = c.turns(id).await.unwrap();
    assert!(turns[4].note.as_deref().unwrap().contains("synthesized"));
    assert_eq!(c.session(id).await.unwrap().status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_cost_ceiling_forces_summary() {
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::Recon))
        .on(AgentRole::Summary, report("Stopped on cost."));
    let mut config = coordinator_config(40);
    config.max_session_cost_usd = Some(0.0001);
    let h = harness(backend, ScriptedTools::new(vec![]), config);
    let mut events = h.events.subscribe_session(SessionId::new());
    let c = &h.coordinator;

    let id = c.start_session("Scan").await.unwrap();
    c.advance(id).await.unwrap();
    assert!(c.cost(id).await.total_cost_usd > 0.0001);

    match c.advance(id).await.unwrap() {
        TurnOutcome::Completed { forced, .. } => {
            assert_eq!(forced, Some(ForcedSummaryReason::CostCeilingReached))
        }
        other => panic!("expected forced summary, got {:?}", other),
    }
    // Unrelated session filter sees nothing.
    assert!(tokio::time::timeout(Duration::from_millis(10), events.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn test_cost_warning_is_emitted_once() {
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::Recon))
        .on(AgentRole::Recon, handoff(AgentRole::Planner))
        .on(AgentRole::Planner, handoff(AgentRole::Recon));
    let mut config = coordinator_config(40);
    config.cost_warning_usd = 0.0001;
    let h = harness(backend, ScriptedTools::new(vec![]), config);
    let mut events = h.coordinator.subscribe();

    let id = h.coordinator.start_session("Scan").await.unwrap();
    for _ in 0..3 {
        h.coordinator.advance(id).await.unwrap();
    }

    let mut warnings = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SessionEvent::CostWarning { .. }) {
            warnings += 1;
        }
    }
    assert_eq!(warnings, 1);
    assert!(h.coordinator.session(id).await.unwrap().cost_warning_emitted);
}

#[tokio::test]
async fn test_stale_approvals_time_out_as_rejected() {
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::InitAccess))
        .on(AgentRole::InitAccess, tool_call(exploit()));
    let mut config = coordinator_config(40);
    config.approval_timeout_secs = Some(0);
    let h = harness(backend, ScriptedTools::new(vec![]), config);
    let c = &h.coordinator;

    let id = c.start_session("Assess").await.unwrap();
    c.advance(id).await.unwrap();
    c.advance(id).await.unwrap();

    let results = c.expire_stale_approvals().await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ToolCallStatus::Rejected);
    let decisions = h
        .memory
        .query(id, MemoryCategory::Note, &MemoryFilter::all().key(approval_key(results[0].tool_call_id)))
        .await
        .unwrap();
    assert_eq!(decisions.len(), 1);
    assert!(decisions[0].content.starts_with("timed_out"));
    assert_eq!(c.session(id).await.unwrap().status, SessionStatus::Running);
}

#[tokio::test]
async fn test_caller_errors() {
    let h = harness(ScriptedBackend::new(), ScriptedTools::new(vec![]), coordinator_config(40));
    let c = &h.coordinator;

    assert!(matches!(c.start_session("   ").await, Err(SwarmError::InvalidObjective)));
    assert!(matches!(
        c.advance(SessionId::new()).await,
        Err(SwarmError::SessionNotFound(_))
    ));
    assert!(matches!(
        c.cancel_session(SessionId::new()).await,
        Err(SwarmError::SessionNotFound(_))
    ));
    assert!(matches!(
        c.submit_approval(ToolCallId::new(), ApprovalOutcome::Approved, "operator").await,
        Err(SwarmError::NoPendingApproval(_))
    ));
    assert!(matches!(
        c.resume_session(SessionId::new()).await,
        Err(SwarmError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn test_concurrent_sessions_are_isolated() {
    let backend = ScriptedBackend::new()
        .on(AgentRole::Planner, handoff(AgentRole::Recon))
        .on(AgentRole::Planner, handoff(AgentRole::Recon))
        .on(AgentRole::Recon, tool_call(nmap()))
        .on(AgentRole::Recon, tool_call(nmap()));
    let tools = ScriptedTools::new(vec![
        ToolStep::Ok(json!({"facts": [{"category": "host", "key": "a", "content": "first"}]})),
        ToolStep::Ok(json!({"facts": [{"category": "host", "key": "b", "content": "second"}]})),
    ]);
    let h = harness(backend, tools, coordinator_config(40));
    let coordinator = Arc::new(h.coordinator);

    let first = coordinator.start_session("Scan A").await.unwrap();
    let second = coordinator.start_session("Scan B").await.unwrap();
    let mut tasks = Vec::new();
    for id in [first, second] {
        let c = coordinator.clone();
        tasks.push(tokio::spawn(async move {
            c.advance(id).await.unwrap();
            c.advance(id).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for id in [first, second] {
        let hosts = h
            .memory
            .query(id, MemoryCategory::Host, &MemoryFilter::all())
            .await
            .unwrap();
        assert_eq!(hosts.len(), 1);
        assert!(hosts.iter().all(|r| r.session_id == id));
        assert_eq!(coordinator.turns(id).await.unwrap().len(), 2);
    }
    assert_eq!(coordinator.list_sessions().await.len(), 2);
}
