// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synaccess NP-02B outlet, driven over its HTTP CGI endpoint.

use std::time::Duration;

use crate::error::{FleetError, Result};

use super::{Outlet, PowerState};

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Np02bOutlet {
    host: String,
    outlet: u32,
    username: String,
    password: String,
}

impl Np02bOutlet {
    pub fn new(host: String, outlet: u32, username: String, password: String) -> Self {
        Self { host, outlet, username, password }
    }

    fn command(&self, cmd: &str) -> Result<String> {
        let url = format!("http://{}/cmd.cgi?{cmd}", self.host);
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| FleetError::Transport(format!("http client: {e}")))?;
        let response = client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .map_err(|e| FleetError::Transport(format!("outlet request: {e}")))?;
        let body = response.text().map_err(|e| FleetError::Transport(format!("outlet body: {e}")))?;
        Ok(body.trim().to_owned())
    }
}

/// Parse a `$A5` status reply. The payload after `$A0,` is a binary
/// string with one digit per outlet, rightmost digit = outlet 1.
pub(crate) fn parse_status(body: &str, outlet: u32) -> PowerState {
    let Some(rest) = body.strip_prefix("$A0,") else {
        return PowerState::Unknown;
    };
    let Some(field) = rest.split(',').next() else {
        return PowerState::Unknown;
    };
    match field.trim().chars().rev().nth(outlet as usize - 1) {
        Some('1') => PowerState::On,
        Some('0') => PowerState::Off,
        _ => PowerState::Unknown,
    }
}

impl Outlet for Np02bOutlet {
    fn read_state(&self) -> PowerState {
        match self.command("$A5") {
            Ok(body) => parse_status(&body, self.outlet),
            Err(_) => PowerState::Unknown,
        }
    }

    fn write_state(&self, on: bool) -> Result<()> {
        let body = self.command(&format!("$A3%20{}%20{}", self.outlet, u32::from(on)))?;
        if body.starts_with("$A0") {
            Ok(())
        } else {
            Err(FleetError::Protocol(format!("outlet rejected write: {body}")))
        }
    }
}
