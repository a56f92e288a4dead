use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use mavlink::common::{MavMessage, FLIGHT_INFORMATION_DATA, STORAGE_INFORMATION_DATA};
use mavlink::MavHeader;
use tokio::sync::{broadcast, Notify};

use super::{DroneConnection, ParamValue, Parameter, ReceivedMessage, RequestTimeout, SetMode};
use crate::flight_plan::MissionItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    ArmDisarm,
    SetMode,
    ClearMission,
    UploadMission,
    SetParameters,
    RequestParameters,
    RequestFlightInformation,
    RequestStorageInformation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ArmDisarm(bool),
    SetMode(SetMode),
    ClearMission,
    UploadMission(Vec<MissionItem>),
    SetParameters(Vec<Parameter>),
    RequestParameters(Vec<String>),
    RequestFlightInformation,
    RequestStorageInformation,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::ArmDisarm(_) => CommandKind::ArmDisarm,
            Self::SetMode(_) => CommandKind::SetMode,
            Self::ClearMission => CommandKind::ClearMission,
            Self::UploadMission(_) => CommandKind::UploadMission,
            Self::SetParameters(_) => CommandKind::SetParameters,
            Self::RequestParameters(_) => CommandKind::RequestParameters,
            Self::RequestFlightInformation => CommandKind::RequestFlightInformation,
            Self::RequestStorageInformation => CommandKind::RequestStorageInformation,
        }
    }
}

/// In-memory transport that records outgoing commands and replays injected messages.
pub struct MockConnection {
    tx: broadcast::Sender<ReceivedMessage>,
    sent: Mutex<Vec<Command>>,
    failing: Mutex<HashSet<CommandKind>>,
    timing_out: Mutex<HashSet<CommandKind>>,
    parameters: Mutex<HashMap<String, ParamValue>>,
    flight_information: Mutex<Option<FLIGHT_INFORMATION_DATA>>,
    storage_information: Mutex<Option<STORAGE_INFORMATION_DATA>>,
    upload_gate: Mutex<Option<Arc<Notify>>>,
}

impl Default for MockConnection {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            tx,
            sent: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            timing_out: Mutex::new(HashSet::new()),
            parameters: Mutex::new(HashMap::new()),
            flight_information: Mutex::new(None),
            storage_information: Mutex::new(None),
            upload_gate: Mutex::new(None),
        }
    }
}

impl MockConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inject(&self, message: MavMessage) {
        self.inject_from(1, 1, message);
    }

    pub fn inject_from(&self, system_id: u8, component_id: u8, message: MavMessage) {
        let header = MavHeader {
            system_id,
            component_id,
            sequence: 0,
        };
        let _ = self.tx.send(ReceivedMessage { header, message });
    }

    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_of(&self, kind: CommandKind) -> Vec<Command> {
        self.sent().into_iter().filter(|c| c.kind() == kind).collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn fail(&self, kind: CommandKind) {
        self.failing.lock().unwrap().insert(kind);
    }

    /// Commands of `kind` get no answer from the vehicle.
    pub fn time_out(&self, kind: CommandKind) {
        self.timing_out.lock().unwrap().insert(kind);
    }

    pub fn set_parameter(&self, id: &str, value: ParamValue) {
        self.parameters.lock().unwrap().insert(id.to_string(), value);
    }

    pub fn set_flight_information(&self, info: FLIGHT_INFORMATION_DATA) {
        *self.flight_information.lock().unwrap() = Some(info);
    }

    pub fn set_storage_information(&self, info: STORAGE_INFORMATION_DATA) {
        *self.storage_information.lock().unwrap() = Some(info);
    }

    /// Uploads block until the returned gate is notified.
    pub fn hold_uploads(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.upload_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    fn record(&self, command: Command) -> Result<()> {
        let kind = command.kind();
        self.sent.lock().unwrap().push(command);
        if self.failing.lock().unwrap().contains(&kind) {
            return Err(anyhow!("{:?} rejected by vehicle", kind));
        }
        if self.timing_out.lock().unwrap().contains(&kind) {
            return Err(anyhow::Error::new(RequestTimeout("COMMAND_LONG")));
        }
        Ok(())
    }
}

#[async_trait]
impl DroneConnection for MockConnection {
    fn subscribe(&self) -> broadcast::Receiver<ReceivedMessage> {
        self.tx.subscribe()
    }

    async fn arm_disarm(&self, arm: bool) -> Result<()> {
        self.record(Command::ArmDisarm(arm))
    }

    async fn set_mode(&self, mode: SetMode) -> Result<()> {
        self.record(Command::SetMode(mode))
    }

    async fn clear_mission(&self) -> Result<()> {
        self.record(Command::ClearMission)
    }

    async fn upload_mission(
        &self,
        items: Vec<MissionItem>,
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<()> {
        let count = items.len();
        self.record(Command::UploadMission(items))?;

        let gate = self.upload_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            progress(0.0);
            gate.notified().await;
        }

        for i in 1..=count {
            progress(i as f64 / count as f64);
        }
        Ok(())
    }

    async fn set_parameters(&self, parameters: Vec<Parameter>) -> Result<()> {
        self.record(Command::SetParameters(parameters))
    }

    async fn request_parameters(&self, ids: &[&str]) -> Result<Vec<Parameter>> {
        self.record(Command::RequestParameters(
            ids.iter().map(|id| id.to_string()).collect(),
        ))?;
        let known = self.parameters.lock().unwrap();
        ids.iter()
            .map(|id| {
                known
                    .get(*id)
                    .map(|value| Parameter {
                        id: id.to_string(),
                        value: *value,
                    })
                    .ok_or_else(|| anyhow::Error::new(RequestTimeout("PARAM_REQUEST_READ")))
            })
            .collect()
    }

    async fn request_flight_information(&self) -> Result<FLIGHT_INFORMATION_DATA> {
        self.record(Command::RequestFlightInformation)?;
        self.flight_information
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::Error::new(RequestTimeout("FLIGHT_INFORMATION")))
    }

    async fn request_storage_information(&self) -> Result<STORAGE_INFORMATION_DATA> {
        self.record(Command::RequestStorageInformation)?;
        self.storage_information
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::Error::new(RequestTimeout("STORAGE_INFORMATION")))
    }
}
