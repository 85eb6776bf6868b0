mod common;

use agora::domain::AgentType;
use agora::runtime::HumanInputResponse;
use agora::sources::MarketFeed;
use agora::state::{FileStateStore, MemoryStateStore};
use common::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Market feeds are down, news is up: the chat answer carries the sentiment
/// and names the trading agent as unavailable.
#[tokio::test]
async fn chat_reports_partial_answers() {
    let orchestrator = orchestrator_with(
        deps(vec![Arc::new(DownMarket)], vec![Arc::new(UpbeatNews)]),
        Arc::new(MemoryStateStore::new()),
    );

    let result = orchestrator
        .chat("s1", "Should I buy S token now?", Some("u1"), json!([]))
        .await;
    assert!(result.success, "chat failed: {:?}", result.error);
    let data = result.data.unwrap();

    assert_eq!(data["intent"]["primary"], "trade");
    assert_eq!(data["intent"]["categories"], json!(["trade", "sentiment"]));
    assert_eq!(data["intent"]["symbols"], json!(["S"]));

    let agents = data["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 2);
    assert_eq!(agents[0]["agentType"], "trading");
    assert_eq!(agents[0]["success"], false);
    assert_eq!(agents[1]["agentType"], "intelligence");
    assert_eq!(agents[1]["success"], true);

    let response = data["response"].as_str().unwrap();
    assert!(response.contains("S sentiment is bullish"), "{response}");
    assert!(response.contains("trading agent"), "{response}");

    // helper agents were created lazily under the chat session
    let status = orchestrator
        .get_agent_status(AgentType::Intelligence, "s1-intelligence")
        .await;
    assert_eq!(status.data.unwrap()["sessionId"], "s1");
}

#[tokio::test]
async fn repeated_price_lookups_hit_the_cache() {
    let market = Arc::new(FixedMarket::new(dec!(0.5)));
    let orchestrator = orchestrator_with(
        deps(vec![market.clone() as Arc<dyn MarketFeed>], vec![]),
        Arc::new(MemoryStateStore::new()),
    );

    let first = orchestrator
        .execute_on_agent(AgentType::Overview, "s1-overview", "get_price", json!({"symbol": "s"}))
        .await;
    let second = orchestrator
        .execute_on_agent(AgentType::Overview, "s1-overview", "get_price", json!({"symbol": "S"}))
        .await;

    assert!(first.success && second.success);
    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.data, second.data);
    assert_eq!(market.calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    let status = orchestrator
        .get_agent_status(AgentType::Overview, "s1-overview")
        .await
        .data
        .unwrap();
    assert_eq!(status["metrics"]["totalRequests"], 2);
    assert_eq!(status["metrics"]["cacheHitRate"], 0.5);
}

#[tokio::test]
async fn chart_analysis_through_the_orchestrator() {
    let orchestrator = healthy_orchestrator();
    let result = orchestrator
        .execute_on_agent(
            AgentType::Charts,
            "s1-charts",
            "analyze",
            json!({"symbol": "BTC", "timeframe": "4h"}),
        )
        .await;
    assert!(result.success, "{:?}", result.error);
    let data = result.data.unwrap();
    assert_eq!(data["symbol"], "BTC");
    assert_eq!(data["timeframe"], "4h");
    assert_eq!(data["trend"]["direction"], "bullish");
    let confidence = data["confidence"].as_f64().unwrap();
    assert!((0.0..=100.0).contains(&confidence));
}

async fn wait_for<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn approved_trade_lands_in_the_ledger() {
    let orchestrator = healthy_orchestrator();
    let proposed = orchestrator
        .execute_on_agent(
            AgentType::Trading,
            "s1-trading",
            "propose_trade",
            json!({"symbol": "S", "side": "buy", "amount": 100}),
        )
        .await;
    assert!(proposed.success, "{:?}", proposed.error);
    let workflow_id = proposed.data.unwrap()["workflowId"]
        .as_str()
        .unwrap()
        .to_string();

    let handle = orchestrator.handle(AgentType::Trading, "s1-trading").unwrap();
    let expected_key = format!("{}:approval", workflow_id);
    wait_for(|| handle.runtime().pending_inputs().contains(&expected_key)).await;

    let submitted = orchestrator.submit_human_input(
        AgentType::Trading,
        "s1-trading",
        HumanInputResponse {
            workflow_id: workflow_id.clone(),
            step_id: "approval".into(),
            response: json!({"approved": true}),
            responder: Some("alice".into()),
        },
    );
    assert_eq!(submitted.data.unwrap()["resolved"], true);

    // the record step completes after the ticket is written
    let mut workflow = Value::Null;
    for _ in 0..200 {
        workflow = orchestrator
            .execute_on_agent(
                AgentType::Trading,
                "s1-trading",
                "trades",
                json!({"workflowId": workflow_id}),
            )
            .await
            .data
            .unwrap();
        if workflow["steps"][3]["status"] == "completed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let statuses: Vec<&str> = workflow["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["completed"; 4]);

    let ledger = orchestrator
        .execute_on_agent(AgentType::Trading, "s1-trading", "trades", json!({}))
        .await
        .data
        .unwrap();
    let tickets = ledger["trades"].as_array().expect("ledger is an array");
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0]["workflowId"], workflow_id.as_str());
    assert_eq!(tickets[0]["approvedBy"], "alice");
    let total: Decimal = tickets[0]["total"].as_str().unwrap().parse().unwrap();
    assert_eq!(total, dec!(50.05));
    assert_eq!(workflow["ticket"]["ticketId"], tickets[0]["ticketId"]);
}

#[tokio::test]
async fn expired_approval_fails_the_step() {
    let orchestrator = healthy_orchestrator();
    let result = orchestrator
        .execute_on_agent(
            AgentType::Trading,
            "s2-trading",
            "propose_trade",
            json!({"symbol": "S", "amount": 1, "wait": true, "approvalTimeoutMs": 30}),
        )
        .await;
    assert!(result.success, "{:?}", result.error);
    let outcome = result.data.unwrap();
    assert_eq!(outcome["status"], "expired");
    assert!(outcome.get("ticket").is_none());
}

#[tokio::test]
async fn health_check_reports_every_agent() {
    let orchestrator = healthy_orchestrator();
    let health = orchestrator.health_check_all("s7").await;
    let keys: Vec<&str> = health.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["charts", "chat", "intelligence", "overview", "trading"]);
    for (agent, result) in &health {
        assert!(result.success, "{agent} failed");
        assert_eq!(
            result.data.as_ref().unwrap()["agentId"],
            format!("s7-{}", agent)
        );
    }
}

#[tokio::test]
async fn state_survives_a_restart_with_the_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let build = || {
        orchestrator_with(
            deps(vec![Arc::new(FixedMarket::new(dec!(0.5)))], vec![]),
            Arc::new(FileStateStore::new(dir.path())),
        )
    };

    let first = build();
    let result = first
        .execute_on_agent(AgentType::Overview, "s1-overview", "get_price", json!({"symbol": "BTC"}))
        .await;
    assert!(result.success);
    drop(first);

    let second = build();
    let status = second
        .get_agent_status(AgentType::Overview, "s1-overview")
        .await
        .data
        .unwrap();
    assert_eq!(status["initialized"], true);
    assert_eq!(status["metrics"]["totalRequests"], 1);
    assert_eq!(status["cacheEntries"], 1);

    let cached = second
        .execute_on_agent(AgentType::Overview, "s1-overview", "get_price", json!({"symbol": "BTC"}))
        .await;
    assert!(cached.cache_hit);

    let reset = second.reset_agent(AgentType::Overview, "s1-overview").await;
    assert!(reset.success);
    let status = second
        .get_agent_status(AgentType::Overview, "s1-overview")
        .await
        .data
        .unwrap();
    assert_eq!(status["initialized"], false);
    assert_eq!(status["metrics"]["totalRequests"], 0);
}

#[tokio::test]
async fn file_store_keeps_lookalike_agent_ids_apart() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator_with(
        deps(vec![Arc::new(FixedMarket::new(dec!(0.5)))], vec![]),
        Arc::new(FileStateStore::new(dir.path())),
    );

    let result = orchestrator
        .execute_on_agent(AgentType::Overview, "a.b", "get_price", json!({"symbol": "BTC"}))
        .await;
    assert!(result.success);

    let status = orchestrator
        .get_agent_status(AgentType::Overview, "a_b")
        .await
        .data
        .unwrap();
    assert_eq!(status["agentId"], "a_b");
    assert_eq!(status["initialized"], false);
    assert_eq!(status["metrics"]["totalRequests"], 0);
}
