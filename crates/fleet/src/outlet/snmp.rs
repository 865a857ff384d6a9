// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic SNMP v2c outlet.

use std::time::Duration;

use snmp2::{Oid, SyncSession, Value};

use crate::error::{FleetError, Result};

use super::{Outlet, PowerState};

const SNMP_TIMEOUT: Duration = Duration::from_secs(2);
const SNMP_PORT: u16 = 161;

/// Parse a dotted OID string into components.
pub(crate) fn parse_oid(oid: &str) -> Result<Vec<u64>> {
    let parts: std::result::Result<Vec<u64>, _> =
        oid.split('.').map(|part| part.parse::<u64>()).collect();
    match parts {
        Ok(parts) if !parts.is_empty() => Ok(parts),
        _ => Err(FleetError::Config(format!("invalid OID {oid:?}"))),
    }
}

pub struct SnmpOutlet {
    host: String,
    query_oid: String,
    query_on_value: i64,
    query_off_value: i64,
    update_oid: String,
    update_on_value: i64,
    update_off_value: i64,
    read_community: String,
    write_community: String,
}

impl SnmpOutlet {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: String,
        query_oid: String,
        query_on_value: i64,
        query_off_value: i64,
        update_oid: String,
        update_on_value: i64,
        update_off_value: i64,
        read_community: String,
        write_community: String,
    ) -> Self {
        Self {
            host,
            query_oid,
            query_on_value,
            query_off_value,
            update_oid,
            update_on_value,
            update_off_value,
            read_community,
            write_community,
        }
    }

    fn addr(&self) -> String {
        if self.host.contains(':') {
            self.host.clone()
        } else {
            format!("{}:{SNMP_PORT}", self.host)
        }
    }

    fn get(&self) -> Result<i64> {
        let parts = parse_oid(&self.query_oid)?;
        let oid = Oid::from(parts.as_slice())
            .map_err(|_| FleetError::Config(format!("invalid OID {:?}", self.query_oid)))?;
        let mut session = SyncSession::new_v2c(
            self.addr(),
            self.read_community.as_bytes(),
            Some(SNMP_TIMEOUT),
            0,
        )
        .map_err(|e| FleetError::Transport(format!("snmp session: {e}")))?;
        let mut response = session
            .get(&oid)
            .map_err(|e| FleetError::Transport(format!("snmp get: {e:?}")))?;
        match response.varbinds.next() {
            Some((_oid, Value::Integer(value))) => Ok(value),
            _ => Err(FleetError::Protocol("snmp get returned no integer".to_owned())),
        }
    }

    fn set(&self, value: i64) -> Result<()> {
        let parts = parse_oid(&self.update_oid)?;
        let oid = Oid::from(parts.as_slice())
            .map_err(|_| FleetError::Config(format!("invalid OID {:?}", self.update_oid)))?;
        let mut session = SyncSession::new_v2c(
            self.addr(),
            self.write_community.as_bytes(),
            Some(SNMP_TIMEOUT),
            0,
        )
        .map_err(|e| FleetError::Transport(format!("snmp session: {e}")))?;
        session
            .set(&[(&oid, Value::Integer(value))])
            .map_err(|e| FleetError::Transport(format!("snmp set: {e:?}")))?;
        Ok(())
    }
}

impl Outlet for SnmpOutlet {
    fn read_state(&self) -> PowerState {
        match self.get() {
            Ok(value) if value == self.query_on_value => PowerState::On,
            Ok(value) if value == self.query_off_value => PowerState::Off,
            Ok(_) | Err(_) => PowerState::Unknown,
        }
    }

    fn write_state(&self, on: bool) -> Result<()> {
        self.set(if on { self.update_on_value } else { self.update_off_value })
    }
}
