// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the control-plane HTTP API.
//!
//! Uses `axum_test::TestServer` — no real TCP needed. Each test gets its
//! own scaffolded config directory via tempfile.

use std::sync::Arc;

use axum_test::TestServer;
use serde_json::{json, Value};

use cabnetd::state::AppState;
use cabnetd::transport::build_router;

struct Fixture {
    dir: tempfile::TempDir,
    server: TestServer,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    for sub in ["roms", "patches", "srams", "settings"] {
        std::fs::create_dir_all(dir.path().join(sub)).expect("scaffold");
    }
    std::fs::write(dir.path().join("roms/crazytaxi.bin"), vec![0u8; 1024]).expect("rom");
    std::fs::write(dir.path().join("roms/ikaruga.bin"), vec![1u8; 1024]).expect("rom");
    std::fs::write(dir.path().join("patches/crazytaxi-freeplay.patch"), "0: 00 -> 01\n")
        .expect("patch");
    std::fs::write(
        dir.path().join("config.yaml"),
        "cabinet_config: cabinets.yaml\n\
         rom_directory: roms\n\
         patch_directory: patches\n\
         sram_directory: srams\n\
         settings_directory: settings\n",
    )
    .expect("config");

    let system = cabnet::SystemConfig::load(dir.path().join("config.yaml")).expect("load");
    let state = Arc::new(AppState::from_config(system).expect("state"));
    let server = TestServer::new(build_router(state)).expect("test server");
    Fixture { dir, server }
}

async fn create_cabinet(server: &TestServer, ip: &str) -> Value {
    let response = server
        .put(&format!("/cabinets/{ip}"))
        .json(&json!({
            "description": format!("cab {ip}"),
            "region": "usa",
            "target": "naomi",
            "version": "4.01",
            "time_hack": false,
            "send_timeout": 10,
        }))
        .await;
    response.assert_status_ok();
    response.json::<Value>()
}

#[tokio::test]
async fn rom_listing_is_wrapped_in_envelope() {
    let fx = fixture();
    let response = fx.server.get("/roms").await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["error"], json!(false));
    let files = body["roms"][0]["files"].as_array().cloned().unwrap_or_default();
    assert_eq!(files, vec![json!("crazytaxi.bin"), json!("ikaruga.bin")]);
}

#[tokio::test]
async fn responses_are_marked_non_cacheable() {
    let fx = fixture();
    let response = fx.server.get("/roms").await;
    let cache = response.header("cache-control");
    assert_eq!(cache.to_str().ok(), Some("no-cache, must-revalidate, private"));
}

#[tokio::test]
async fn cabinet_create_read_update_delete() {
    let fx = fixture();

    let created = create_cabinet(&fx.server, "10.0.0.1").await;
    assert_eq!(created["error"], json!(false));
    assert_eq!(created["ip"], json!("10.0.0.1"));
    assert_eq!(created["status"], json!("inactive"));
    assert_eq!(created["state"], json!("startup"));
    assert_eq!(created["outlet"], json!({ "type": "none" }));
    // Creation enables every known game.
    assert_eq!(created["options"].as_array().map(Vec::len), Some(2));

    // Duplicate creation stays on the envelope.
    let duplicate = fx
        .server
        .put("/cabinets/10.0.0.1")
        .json(&json!({
            "description": "again",
            "region": "usa",
            "target": "naomi",
            "version": "4.01",
        }))
        .await;
    let body = duplicate.json::<Value>();
    assert_eq!(body["error"], json!(true));
    assert!(body["message"].as_str().unwrap_or_default().contains("already exists"));

    let listed = fx.server.get("/cabinets").await.json::<Value>();
    assert_eq!(listed["cabinets"].as_array().map(Vec::len), Some(1));

    let updated = fx
        .server
        .post("/cabinets/10.0.0.1")
        .json(&json!({
            "description": "front row",
            "region": "japan",
            "target": "naomi",
            "version": "4.01",
            "enabled": false,
            "time_hack": false,
            "skip_crc": true,
            "skip_now_load": false,
            "send_timeout": 10,
        }))
        .await
        .json::<Value>();
    assert_eq!(updated["description"], json!("front row"));
    assert_eq!(updated["enabled"], json!(false));
    assert_eq!(updated["skip_crc"], json!(true));

    let deleted = fx.server.delete("/cabinets/10.0.0.1").await.json::<Value>();
    assert_eq!(deleted["error"], json!(false));
    let missing = fx.server.get("/cabinets/10.0.0.1").await.json::<Value>();
    assert_eq!(missing["error"], json!(true));
}

#[tokio::test]
async fn cabinet_records_are_persisted_to_yaml() {
    let fx = fixture();
    create_cabinet(&fx.server, "10.0.0.2").await;

    let persisted =
        std::fs::read_to_string(fx.dir.path().join("cabinets.yaml")).unwrap_or_default();
    assert!(persisted.contains("10.0.0.2"), "cabinet file: {persisted}");
}

#[tokio::test]
async fn selected_game_must_be_enabled() {
    let fx = fixture();
    create_cabinet(&fx.server, "10.0.0.3").await;

    let rejected = fx
        .server
        .post("/cabinets/10.0.0.3/filename")
        .json(&json!({ "filename": "nonsense.bin" }))
        .await
        .json::<Value>();
    assert_eq!(rejected["error"], json!(true));

    let rom = fx.dir.path().join("roms/crazytaxi.bin").to_string_lossy().into_owned();
    let accepted = fx
        .server
        .post("/cabinets/10.0.0.3/filename")
        .json(&json!({ "filename": rom }))
        .await
        .json::<Value>();
    assert_eq!(accepted["error"], json!(false));
    assert_eq!(accepted["filename"], json!(rom));

    let cleared = fx
        .server
        .post("/cabinets/10.0.0.3/filename")
        .json(&json!({ "filename": null }))
        .await
        .json::<Value>();
    assert_eq!(cleared["filename"], json!(null));
}

#[tokio::test]
async fn power_control_honors_the_controllable_gate() {
    let fx = fixture();
    create_cabinet(&fx.server, "10.0.0.4").await;

    // No outlet: reads mirror the last command.
    let power = fx.server.get("/cabinets/10.0.0.4/power").await.json::<Value>();
    assert_eq!(power["power_state"], json!("unknown"));

    let turned_on =
        fx.server.post("/cabinets/10.0.0.4/power/on").await.json::<Value>();
    assert_eq!(turned_on["power_state"], json!("on"));

    // Disable control, then verify the gate and the admin override.
    fx.server
        .post("/cabinets/10.0.0.4/outlet")
        .json(&json!({ "outlet": { "type": "none" }, "controllable": false, "power_cycle": false }))
        .await
        .json::<Value>();

    let denied = fx.server.post("/cabinets/10.0.0.4/power/off").await.json::<Value>();
    assert_eq!(denied["error"], json!(true));

    let overridden = fx
        .server
        .post("/cabinets/10.0.0.4/power/off")
        .json(&json!({ "admin": true }))
        .await
        .json::<Value>();
    assert_eq!(overridden["error"], json!(false));
    assert_eq!(overridden["power_state"], json!("off"));

    let invalid = fx.server.post("/cabinets/10.0.0.4/power/sideways").await.json::<Value>();
    assert_eq!(invalid["error"], json!(true));
}

#[tokio::test]
async fn invalid_outlet_configs_degrade_to_none() {
    let fx = fixture();
    create_cabinet(&fx.server, "10.0.0.5").await;

    let body = fx
        .server
        .post("/cabinets/10.0.0.5/outlet")
        .json(&json!({
            "outlet": { "type": "ap7900", "host": "10.0.0.250", "outlet": 99 },
            "controllable": true,
            "power_cycle": true,
        }))
        .await
        .json::<Value>();
    assert_eq!(body["outlet"], json!({ "type": "none" }));
    assert_eq!(body["power_cycle"], json!(true));

    let body = fx
        .server
        .post("/cabinets/10.0.0.5/outlet")
        .json(&json!({
            "outlet": { "type": "np-02", "host": "10.0.0.250", "outlet": 2 },
            "controllable": true,
            "power_cycle": true,
        }))
        .await
        .json::<Value>();
    assert_eq!(body["outlet"]["type"], json!("np-02"));
    assert_eq!(body["outlet"]["community"], json!("public"));
}

#[tokio::test]
async fn patch_upload_and_applicability() {
    let fx = fixture();

    let uploaded = fx
        .server
        .put("/patches/ikaruga-region_free.patch")
        .bytes("0: 01 -> 02\n".into())
        .await
        .json::<Value>();
    assert_eq!(uploaded["error"], json!(false));

    let listed = fx.server.get("/patches").await.json::<Value>();
    let files = listed["patches"][0]["files"].as_array().cloned().unwrap_or_default();
    assert_eq!(files.len(), 2);

    let rom = fx.dir.path().join("roms/ikaruga.bin").to_string_lossy().into_owned();
    let applicable =
        fx.server.get(&format!("/patches/{rom}")).await.json::<Value>();
    let files = applicable["patches"][0]["files"].as_array().cloned().unwrap_or_default();
    assert_eq!(files, vec![json!("ikaruga-region_free.patch")]);

    let recalc = fx.server.delete("/patches").await.json::<Value>();
    assert_eq!(recalc["error"], json!(false));
}

#[tokio::test]
async fn game_assignment_round_trip() {
    let fx = fixture();
    create_cabinet(&fx.server, "10.0.0.6").await;

    let games = fx.server.get("/cabinets/10.0.0.6/games").await.json::<Value>();
    let entries = games["games"].as_array().cloned().unwrap_or_default();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|g| g["enabled"] == json!(true)));

    let crazytaxi = fx.dir.path().join("roms/crazytaxi.bin").to_string_lossy().into_owned();
    let ikaruga = fx.dir.path().join("roms/ikaruga.bin").to_string_lossy().into_owned();
    let patch =
        fx.dir.path().join("patches/crazytaxi-freeplay.patch").to_string_lossy().into_owned();

    let updated = fx
        .server
        .post("/cabinets/10.0.0.6/games")
        .json(&json!({
            "games": [
                {
                    "file": crazytaxi,
                    "enabled": true,
                    "patches": [{ "file": patch, "enabled": true }],
                },
                { "file": ikaruga, "enabled": false },
            ]
        }))
        .await
        .json::<Value>();
    assert_eq!(updated["error"], json!(false));

    let entries = updated["games"].as_array().cloned().unwrap_or_default();
    let crazy = entries
        .iter()
        .find(|g| g["file"] == json!(crazytaxi))
        .cloned()
        .unwrap_or_default();
    assert_eq!(crazy["enabled"], json!(true));
    assert_eq!(crazy["patches"][0]["enabled"], json!(true));
    let ika = entries.iter().find(|g| g["file"] == json!(ikaruga)).cloned().unwrap_or_default();
    assert_eq!(ika["enabled"], json!(false));
}

#[tokio::test]
async fn info_soft_fails_for_unreachable_boards() {
    let fx = fixture();
    // A closed local port keeps the one-shot info call fast.
    let response = fx
        .server
        .put("/cabinets/127.0.0.1:1")
        .json(&json!({
            "description": "bench",
            "region": "japan",
            "target": "naomi",
            "version": "4.01",
        }))
        .await;
    response.assert_status_ok();

    let info = fx.server.get("/cabinets/127.0.0.1:1/info").await.json::<Value>();
    assert_eq!(info, json!({ "error": false }));
}
