// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON handlers for the control plane.
//!
//! Endpoints mirror the fleet model: cabinet CRUD, outlet and power
//! control, per-cabinet game assignment, and library listings. Every
//! mutation rewrites the persisted YAML documents before answering.

use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use cabnet::directory::Library;
use cabnet::{
    Cabinet, CabinetConfig, CabinetUpdate, FleetError, OutletConfig, Region, Target,
};

use crate::error::{ok, ApiError, ApiResult};
use crate::state::AppState;

// -- Helpers ------------------------------------------------------------------

async fn cabinet_for(state: &AppState, ip: &str) -> Result<Arc<Mutex<Cabinet>>, ApiError> {
    state
        .manager
        .cabinet(ip)
        .await
        .ok_or_else(|| ApiError::msg(format!("no cabinet with address {ip}")))
}

async fn cabinet_json(cabinet: &Cabinet) -> Value {
    let host = cabinet.host();
    let status = host.status().await;
    let progress = host.progress().await.unwrap_or((-1, -1));
    let outlet = cabinet
        .outlet_config()
        .and_then(|config| serde_json::to_value(config).ok())
        .unwrap_or_else(|| json!({ "type": "none" }));

    let mut options: Vec<Value> = cabinet
        .patches
        .keys()
        .map(|file| json!({ "file": file, "name": Library::display_name(file) }))
        .collect();
    options.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

    json!({
        "ip": cabinet.ip,
        "description": cabinet.description,
        "region": cabinet.region,
        "game": cabinet
            .selected_filename()
            .map_or_else(|| "no game selected".to_owned(), Library::display_name),
        "filename": cabinet.selected_filename(),
        "options": options,
        "target": cabinet.target,
        "version": cabinet.version,
        "state": cabinet.state(),
        "status": status,
        "progress": [progress.0, progress.1],
        "enabled": cabinet.enabled,
        "controllable": cabinet.controllable,
        "power_state": cabinet.power_state(),
        "outlet": outlet,
        "time_hack": cabinet.time_hack,
        "skip_crc": cabinet.skip_crc,
        "skip_now_load": cabinet.skip_now_load,
        "power_cycle": cabinet.power_cycle,
        "send_timeout": cabinet.send_timeout,
    })
}

fn library_listing(library: &Library, key: &str) -> Json<Value> {
    let mut groups: Vec<Value> = library
        .directories()
        .iter()
        .map(|directory| {
            json!({
                "name": directory.to_string_lossy(),
                "files": library.files(directory),
            })
        })
        .collect();
    groups.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    let mut payload = serde_json::Map::new();
    payload.insert(key.to_owned(), Value::Array(groups));
    ok(Value::Object(payload))
}

/// The wildcard route strips the leading slash from absolute paths.
fn restore_path(filename: &str) -> String {
    if filename.starts_with('/') || filename.contains(':') {
        filename.to_owned()
    } else {
        format!("/{filename}")
    }
}

fn grouped_by_directory(paths: Vec<String>, key: &str) -> Json<Value> {
    let mut by_directory: HashMap<String, Vec<String>> = HashMap::new();
    for path in paths {
        let path = FsPath::new(&path);
        let directory =
            path.parent().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        by_directory.entry(directory).or_default().push(name);
    }
    let mut groups: Vec<Value> = by_directory
        .into_iter()
        .map(|(directory, mut files)| {
            files.sort();
            json!({ "name": directory, "files": files })
        })
        .collect();
    groups.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    let mut payload = serde_json::Map::new();
    payload.insert(key.to_owned(), Value::Array(groups));
    ok(Value::Object(payload))
}

// -- Library handlers ---------------------------------------------------------

pub async fn list_roms(State(state): State<Arc<AppState>>) -> ApiResult {
    Ok(library_listing(&state.roms, "roms"))
}

pub async fn list_patches(State(state): State<Arc<AppState>>) -> ApiResult {
    Ok(library_listing(&state.patches, "patches"))
}

pub async fn list_srams(State(state): State<Arc<AppState>>) -> ApiResult {
    Ok(library_listing(&state.srams, "srams"))
}

pub async fn list_settings(State(state): State<Arc<AppState>>) -> ApiResult {
    Ok(library_listing(&state.settings, "settings"))
}

pub async fn applicable_patches(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> ApiResult {
    Ok(grouped_by_directory(state.patches.applicable_to(&restore_path(&filename)), "patches"))
}

pub async fn applicable_srams(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> ApiResult {
    Ok(grouped_by_directory(state.srams.applicable_to(&restore_path(&filename)), "srams"))
}

pub async fn applicable_settings(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> ApiResult {
    Ok(grouped_by_directory(state.settings.applicable_to(&restore_path(&filename)), "settings"))
}

pub async fn recalculate_patches(State(state): State<Arc<AppState>>) -> ApiResult {
    state.patches.recalculate(None);
    Ok(ok(json!({})))
}

pub async fn recalculate_patch(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> ApiResult {
    state.patches.recalculate(Some(&restore_path(&filename)));
    Ok(ok(json!({})))
}

pub async fn recalculate_srams(State(state): State<Arc<AppState>>) -> ApiResult {
    state.srams.recalculate(None);
    Ok(ok(json!({})))
}

pub async fn recalculate_sram(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> ApiResult {
    state.srams.recalculate(Some(&restore_path(&filename)));
    Ok(ok(json!({})))
}

pub async fn upload_patch(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    body: Bytes,
) -> ApiResult {
    let path = state.patches.upload(&filename, &body)?;
    state.persist().await?;
    Ok(ok(json!({ "file": path })))
}

pub async fn upload_sram(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    body: Bytes,
) -> ApiResult {
    let path = state.srams.upload(&filename, &body)?;
    state.persist().await?;
    Ok(ok(json!({ "file": path })))
}

pub async fn upload_setting(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    body: Bytes,
) -> ApiResult {
    let path = state.settings.upload(&filename, &body)?;
    state.persist().await?;
    Ok(ok(json!({ "file": path })))
}

pub async fn recalculate_settings(State(state): State<Arc<AppState>>) -> ApiResult {
    state.settings.recalculate(None);
    Ok(ok(json!({})))
}

// -- Cabinet handlers ---------------------------------------------------------

pub async fn list_cabinets(State(state): State<Arc<AppState>>) -> ApiResult {
    let mut cabinets = Vec::new();
    for ip in state.manager.ips().await {
        if let Some(cabinet) = state.manager.cabinet(&ip).await {
            cabinets.push(cabinet_json(&*cabinet.lock().await).await);
        }
    }
    cabinets.sort_by(|a, b| a["description"].as_str().cmp(&b["description"].as_str()));
    Ok(ok(json!({ "cabinets": cabinets })))
}

pub async fn get_cabinet(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> ApiResult {
    let cabinet = cabinet_for(&state, &ip).await?;
    let payload = cabinet_json(&*cabinet.lock().await).await;
    Ok(ok(payload))
}

#[derive(Debug, Deserialize)]
pub struct CreateCabinet {
    pub description: String,
    pub region: Region,
    pub target: Target,
    pub version: cabnet::ProtocolVersion,
    #[serde(default)]
    pub time_hack: bool,
    #[serde(default)]
    pub send_timeout: Option<u64>,
}

pub async fn create_cabinet(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
    Json(body): Json<CreateCabinet>,
) -> ApiResult {
    if state.manager.exists(&ip).await {
        return Err(ApiError::msg(format!("cabinet {ip} already exists")));
    }

    // Start with every game selectable instead of none.
    let mut patches = HashMap::new();
    let mut settings = HashMap::new();
    let mut srams = HashMap::new();
    for rom in state.roms.all_files() {
        patches.insert(rom.clone(), Vec::new());
        settings.insert(rom.clone(), None);
        srams.insert(rom, None);
    }

    let cabinet = state
        .manager
        .add(CabinetConfig {
            ip: ip.clone(),
            description: body.description,
            region: body.region,
            target: body.target,
            version: body.version,
            enabled: true,
            controllable: true,
            time_hack: body.time_hack,
            skip_crc: false,
            skip_now_load: false,
            power_cycle: false,
            send_timeout: body.send_timeout,
            outlet: None,
            filename: None,
            patches,
            settings,
            srams,
        })
        .await?;
    state.persist().await?;
    let payload = cabinet_json(&*cabinet.lock().await).await;
    Ok(ok(payload))
}

pub async fn update_cabinet(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
    Json(update): Json<CabinetUpdate>,
) -> ApiResult {
    let cabinet = cabinet_for(&state, &ip).await?;
    let payload = {
        let mut cabinet = cabinet.lock().await;
        cabinet.apply_update(update).await;
        cabinet_json(&cabinet).await
    };
    state.persist().await?;
    Ok(ok(payload))
}

pub async fn delete_cabinet(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> ApiResult {
    state.manager.remove(&ip).await?;
    state.persist().await?;
    Ok(ok(json!({})))
}

#[derive(Debug, Deserialize)]
pub struct OutletUpdate {
    #[serde(default)]
    pub outlet: Value,
    pub controllable: bool,
    pub power_cycle: bool,
}

pub async fn update_outlet(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
    Json(body): Json<OutletUpdate>,
) -> ApiResult {
    let cabinet = cabinet_for(&state, &ip).await?;
    // A config that does not parse degrades to no outlet, like any other
    // invalid outlet config.
    let config = serde_json::from_value::<OutletConfig>(body.outlet).ok();
    let payload = {
        let mut cabinet = cabinet.lock().await;
        cabinet.set_outlet(config, body.controllable, body.power_cycle);
        cabinet_json(&cabinet).await
    };
    state.persist().await?;
    Ok(ok(payload))
}

pub async fn get_power(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> ApiResult {
    let cabinet = cabinet_for(&state, &ip).await?;
    let power_state = cabinet.lock().await.read_power_state().await;
    Ok(ok(json!({ "power_state": power_state })))
}

#[derive(Debug, Default, Deserialize)]
pub struct PowerBody {
    #[serde(default)]
    pub admin: bool,
}

pub async fn set_power(
    State(state): State<Arc<AppState>>,
    Path((ip, power_state)): Path<(String, String)>,
    body: Option<Json<PowerBody>>,
) -> ApiResult {
    let on = match power_state.as_str() {
        "on" => true,
        "off" => false,
        _ => return Err(ApiError::msg("expected power state on or off")),
    };
    let admin = body.map(|Json(b)| b.admin).unwrap_or(false);

    let cabinet = cabinet_for(&state, &ip).await?;
    let payload = {
        let mut cabinet = cabinet.lock().await;
        // An explicit admin command supersedes the controllable gate.
        if !admin && !cabinet.controllable {
            return Err(ApiError::msg("cabinet control has been disabled"));
        }
        cabinet.set_power_state(on).await;
        cabinet_json(&cabinet).await
    };
    Ok(ok(payload))
}

pub async fn cabinet_info(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> ApiResult {
    let cabinet = cabinet_for(&state, &ip).await?;
    let info = {
        let cabinet = cabinet.lock().await;
        cabinet.host().info().await
    };
    match info {
        Some(info) => Ok(ok(json!({
            "version": info.firmware_version,
            "memsize": info.memory_size,
            "memavail": info.available_game_memory / 1024 / 1024,
            "available": true,
        }))),
        None => Ok(ok(json!({}))),
    }
}

pub async fn cabinet_games(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> ApiResult {
    let cabinet = cabinet_for(&state, &ip).await?;
    let cabinet = cabinet.lock().await;

    let mut games = Vec::new();
    for file in state.roms.all_files() {
        let assigned = cabinet.patches.get(&file);
        let patch_entries: Vec<Value> = state
            .patches
            .applicable_to(&file)
            .into_iter()
            .map(|patch| {
                json!({
                    "file": patch,
                    "name": Library::display_name(&patch),
                    "enabled": assigned.map(|list| list.contains(&patch)).unwrap_or(false),
                })
            })
            .collect();

        let mut game = json!({
            "file": file,
            "name": Library::display_name(&file),
            "enabled": assigned.is_some(),
            "patches": patch_entries,
        });
        if cabinet.target == Target::Naomi {
            game["settings"] = json!({
                "enabled": matches!(cabinet.settings.get(&file), Some(Some(_))),
                "choices": state.settings.applicable_to(&file),
            });
            game["sram"] = json!({
                "active": cabinet.srams.get(&file).cloned().flatten().unwrap_or_default(),
                "choices": state.srams.applicable_to(&file),
            });
        }
        games.push(game);
    }
    games.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    Ok(ok(json!({ "games": games })))
}

#[derive(Debug, Deserialize)]
pub struct PatchAssignment {
    pub file: String,
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct GameAssignment {
    pub file: String,
    pub enabled: bool,
    #[serde(default)]
    pub patches: Vec<PatchAssignment>,
    /// Path of a NAOMI settings file to splice, empty or absent for none.
    #[serde(default)]
    pub settings: Option<String>,
    /// Path of an SRAM file to splice, empty or absent for none.
    #[serde(default)]
    pub sram: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GamesUpdate {
    pub games: Vec<GameAssignment>,
}

pub async fn update_cabinet_games(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
    Json(body): Json<GamesUpdate>,
) -> ApiResult {
    let cabinet = cabinet_for(&state, &ip).await?;
    {
        let mut cabinet = cabinet.lock().await;
        for game in body.games {
            if !game.enabled {
                cabinet.patches.remove(&game.file);
                cabinet.settings.remove(&game.file);
                cabinet.srams.remove(&game.file);
                if cabinet.selected_filename() == Some(game.file.as_str()) {
                    let _ = cabinet.set_filename(None);
                }
                continue;
            }

            let enabled_patches: Vec<String> =
                game.patches.into_iter().filter(|p| p.enabled).map(|p| p.file).collect();
            cabinet.patches.insert(game.file.clone(), enabled_patches);

            if cabinet.target == Target::Naomi {
                let settings = match game.settings.filter(|path| !path.is_empty()) {
                    Some(path) => Some(state.settings.load(&path)?),
                    None => None,
                };
                cabinet.settings.insert(game.file.clone(), settings);

                let sram = game.sram.filter(|path| !path.is_empty());
                if let Some(ref path) = sram {
                    if !state.srams.contains(path) {
                        return Err(FleetError::NotFound(path.clone()).into());
                    }
                }
                cabinet.srams.insert(game.file, sram);
            } else {
                cabinet.settings.insert(game.file.clone(), None);
                cabinet.srams.insert(game.file, None);
            }
        }
    }
    state.persist().await?;
    cabinet_games(State(state), Path(ip)).await
}

#[derive(Debug, Deserialize)]
pub struct FilenameBody {
    pub filename: Option<String>,
}

pub async fn set_filename(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
    Json(body): Json<FilenameBody>,
) -> ApiResult {
    let cabinet = cabinet_for(&state, &ip).await?;
    let payload = {
        let mut cabinet = cabinet.lock().await;
        cabinet.set_filename(body.filename)?;
        cabinet_json(&cabinet).await
    };
    state.persist().await?;
    Ok(ok(payload))
}
