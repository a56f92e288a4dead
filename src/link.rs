//! The MAVLink transport used in production.
//!
//! Opens a `mavlink` connection string (`udpin:`, `udpout:`, `tcpout:`, `serial:`), forwards every
//! frame from the target system to subscribers and runs the command, mission and parameter
//! handshakes with timeouts and retries.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use mavlink::common::{
    MavAutopilot, MavCmd, MavMessage, MavMissionResult, MavModeFlag, MavParamType, MavResult,
    MavState, MavType, COMMAND_LONG_DATA, FLIGHT_INFORMATION_DATA, HEARTBEAT_DATA,
    MISSION_CLEAR_ALL_DATA, MISSION_COUNT_DATA, MISSION_ITEM_INT_DATA,
    PARAM_REQUEST_READ_DATA, PARAM_SET_DATA, STORAGE_INFORMATION_DATA,
};
use mavlink::error::MessageReadError;
use mavlink::{MavConnection, MavHeader, MessageData};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::time::{interval, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MavlinkConfig;
use crate::connection::{
    DroneConnection, ParamValue, Parameter, ReceivedMessage, RequestTimeout, SetMode,
};
use crate::flight_plan::MissionItem;
use crate::util::{bytes_from_text, text_from_bytes};
use crate::vehicle::AutopilotFamily;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
const TEMPORARY_REJECTION_RETRIES: u32 = 3;
const TEMPORARY_REJECTION_DELAY: Duration = Duration::from_millis(500);
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

type Connection = Arc<dyn MavConnection<MavMessage> + Send + Sync>;

/// How integer parameters travel in the float field of PARAM_SET / PARAM_VALUE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamEncoding {
    /// The integer bits are reinterpreted as a float (PX4).
    Bytewise,
    /// The integer is converted to the nearest float (ArduPilot).
    CCast,
}

impl ParamEncoding {
    pub fn for_family(family: AutopilotFamily) -> Self {
        match family {
            AutopilotFamily::Px4 | AutopilotFamily::Px4ObstacleAvoidance => Self::Bytewise,
            AutopilotFamily::ArduCopter | AutopilotFamily::ArduPlane | AutopilotFamily::QuadPlane => {
                Self::CCast
            }
        }
    }

    fn encode(self, value: ParamValue) -> (f32, MavParamType) {
        match value {
            ParamValue::Float(v) => (v, MavParamType::MAV_PARAM_TYPE_REAL32),
            ParamValue::Int32(v) => {
                let raw = match self {
                    Self::Bytewise => f32::from_bits(v as u32),
                    Self::CCast => v as f32,
                };
                (raw, MavParamType::MAV_PARAM_TYPE_INT32)
            }
        }
    }

    fn decode(self, raw: f32, param_type: MavParamType) -> ParamValue {
        match param_type {
            MavParamType::MAV_PARAM_TYPE_REAL32 | MavParamType::MAV_PARAM_TYPE_REAL64 => {
                ParamValue::Float(raw)
            }
            _ => ParamValue::Int32(match self {
                Self::Bytewise => raw.to_bits() as i32,
                Self::CCast => raw as i32,
            }),
        }
    }
}

enum MissionReply {
    Request(u16),
    Ack(MavMissionResult),
}

pub struct MavlinkLink {
    connection: Connection,
    header: MavHeader,
    target_system: u8,
    target_component: u8,
    timeout: Duration,
    retries: u32,
    encoding: ParamEncoding,
    tx: broadcast::Sender<ReceivedMessage>,
    cancel: CancellationToken,
    // Mission and parameter transfers must not interleave.
    transfer: Mutex<()>,
}

impl MavlinkLink {
    /// Connects and starts the reader thread and the ground station heartbeat.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: &MavlinkConfig, encoding: ParamEncoding) -> Result<Arc<Self>> {
        let connection: Connection = Arc::from(
            mavlink::connect::<MavMessage>(&config.connection_string)
                .with_context(|| format!("mavlink connect {}", config.connection_string))?,
        );
        info!("MAVLink connected on {}", config.connection_string);

        let (tx, _) = broadcast::channel(1024);
        let link = Arc::new(Self {
            connection,
            header: MavHeader {
                system_id: config.system_id,
                component_id: config.component_id,
                sequence: 0,
            },
            target_system: config.target_system,
            target_component: config.target_component,
            timeout: config.command_timeout(),
            retries: config.command_retries,
            encoding,
            tx,
            cancel: CancellationToken::new(),
            transfer: Mutex::new(()),
        });

        link.spawn_reader()?;
        link.spawn_heartbeat();
        Ok(link)
    }

    /// Stops the reader and the heartbeat.
    pub fn close(&self) {
        info!("Closing MAVLink link");
        self.cancel.cancel();
    }

    fn spawn_reader(&self) -> Result<()> {
        let connection = Arc::clone(&self.connection);
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        let target_system = self.target_system;

        std::thread::Builder::new()
            .name("mavlink-reader".into())
            .spawn(move || {
                while !cancel.is_cancelled() {
                    match connection.recv() {
                        Ok((header, message)) if header.system_id == target_system => {
                            let _ = tx.send(ReceivedMessage { header, message });
                        }
                        Ok(_) => {}
                        Err(MessageReadError::Io(e))
                            if e.kind() == std::io::ErrorKind::WouldBlock => {}
                        Err(MessageReadError::Io(e)) => {
                            warn!("MAVLink read failed: {}", e);
                            std::thread::sleep(READ_ERROR_BACKOFF);
                        }
                        Err(e) => debug!("Dropping unparsable frame: {:?}", e),
                    }
                }
                debug!("MAVLink reader stopped");
            })
            .context("spawn mavlink reader")?;
        Ok(())
    }

    fn spawn_heartbeat(self: &Arc<Self>) {
        let link = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(HEARTBEAT_INTERVAL);
            let heartbeat = MavMessage::HEARTBEAT(HEARTBEAT_DATA {
                custom_mode: 0,
                mavtype: MavType::MAV_TYPE_GCS,
                autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
                base_mode: MavModeFlag::empty(),
                system_status: MavState::MAV_STATE_ACTIVE,
                mavlink_version: 3,
            });
            loop {
                tokio::select! {
                    _ = link.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = link.send(&heartbeat) {
                            warn!("Heartbeat not sent: {}", e);
                        }
                    }
                }
            }
        });
    }

    fn send(&self, message: &MavMessage) -> Result<()> {
        self.connection
            .send(&self.header, message)
            .map_err(|e| anyhow!("mavlink send: {:?}", e))?;
        Ok(())
    }

    /// Sends `request(attempt)` until `accept` picks an answer or the retries run out.
    async fn exchange<T>(
        &self,
        rx: &mut broadcast::Receiver<ReceivedMessage>,
        what: &'static str,
        retries: u32,
        request: impl Fn(u32) -> MavMessage,
        mut accept: impl FnMut(&MavMessage) -> Option<T>,
    ) -> Result<T> {
        for attempt in 0..=retries {
            if attempt > 0 {
                debug!("{} not answered, retry {}/{}", what, attempt, retries);
            }
            self.send(&request(attempt))?;
            if let Ok(answer) = timeout(self.timeout, next_matching(rx, &mut accept)).await {
                return answer;
            }
        }
        Err(anyhow::Error::new(RequestTimeout(what)))
    }

    async fn command(&self, command: MavCmd, params: [f32; 7]) -> Result<()> {
        self.command_with_retries(command, params, self.retries)
            .await
    }

    async fn command_with_retries(
        &self,
        command: MavCmd,
        params: [f32; 7],
        retries: u32,
    ) -> Result<()> {
        for _ in 0..=TEMPORARY_REJECTION_RETRIES {
            let mut rx = self.tx.subscribe();
            let result = self
                .exchange(
                    &mut rx,
                    "COMMAND_LONG",
                    retries,
                    |attempt| self.command_long(command, params, attempt),
                    |message| match message {
                        MavMessage::COMMAND_ACK(ack)
                            if ack.command == command
                                && ack.result != MavResult::MAV_RESULT_IN_PROGRESS =>
                        {
                            Some(ack.result)
                        }
                        _ => None,
                    },
                )
                .await?;

            match result {
                MavResult::MAV_RESULT_ACCEPTED => return Ok(()),
                MavResult::MAV_RESULT_TEMPORARILY_REJECTED => {
                    debug!("{:?} temporarily rejected", command);
                    sleep(TEMPORARY_REJECTION_DELAY).await;
                }
                other => bail!("{:?} rejected: {:?}", command, other),
            }
        }
        bail!("{:?} kept being temporarily rejected", command)
    }

    fn command_long(&self, command: MavCmd, params: [f32; 7], attempt: u32) -> MavMessage {
        MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
            command,
            target_system: self.target_system,
            target_component: self.target_component,
            confirmation: u8::try_from(attempt).unwrap_or(u8::MAX),
        })
    }

    /// Asks for one message with MAV_CMD_REQUEST_MESSAGE, without retries.
    async fn request_message<T>(
        &self,
        message_id: u32,
        param2: f32,
        what: &'static str,
        mut extract: impl FnMut(&MavMessage) -> Option<T>,
    ) -> Result<T> {
        let mut rx = self.tx.subscribe();
        let params = [message_id as f32, param2, 0.0, 0.0, 0.0, 0.0, 0.0];
        self.command_with_retries(MavCmd::MAV_CMD_REQUEST_MESSAGE, params, 0)
            .await?;
        timeout(self.timeout, next_matching(&mut rx, &mut extract))
            .await
            .map_err(|_| anyhow::Error::new(RequestTimeout(what)))?
    }

    async fn read_parameter(&self, id: &str) -> Result<Parameter> {
        let mut rx = self.tx.subscribe();
        let request = MavMessage::PARAM_REQUEST_READ(PARAM_REQUEST_READ_DATA {
            param_index: -1,
            target_system: self.target_system,
            target_component: self.target_component,
            param_id: bytes_from_text(id),
        });
        let encoding = self.encoding;
        self.exchange(
            &mut rx,
            "PARAM_REQUEST_READ",
            self.retries,
            |_| request.clone(),
            |message| match message {
                MavMessage::PARAM_VALUE(value) if text_from_bytes(&value.param_id) == id => {
                    Some(Parameter {
                        id: id.to_string(),
                        value: encoding.decode(value.param_value, value.param_type),
                    })
                }
                _ => None,
            },
        )
        .await
    }

    async fn write_parameter(&self, parameter: &Parameter) -> Result<()> {
        let mut rx = self.tx.subscribe();
        let (param_value, param_type) = self.encoding.encode(parameter.value);
        let request = MavMessage::PARAM_SET(PARAM_SET_DATA {
            param_value,
            target_system: self.target_system,
            target_component: self.target_component,
            param_id: bytes_from_text(&parameter.id),
            param_type,
        });
        let echoed = self
            .exchange(
                &mut rx,
                "PARAM_SET",
                self.retries,
                |_| request.clone(),
                |message| match message {
                    MavMessage::PARAM_VALUE(value)
                        if text_from_bytes(&value.param_id) == parameter.id =>
                    {
                        Some(value.param_value)
                    }
                    _ => None,
                },
            )
            .await?;

        if echoed.to_bits() != param_value.to_bits() {
            bail!(
                "Parameter {} not accepted, autopilot reports {:?}",
                parameter.id,
                self.encoding.decode(echoed, param_type)
            );
        }
        Ok(())
    }
}

/// Waits for the next message `accept` picks.
async fn next_matching<T>(
    rx: &mut broadcast::Receiver<ReceivedMessage>,
    accept: &mut impl FnMut(&MavMessage) -> Option<T>,
) -> Result<T> {
    loop {
        match rx.recv().await {
            Ok(received) => {
                if let Some(answer) = accept(&received.message) {
                    return Ok(answer);
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!("Link receiver lagged by {} messages", skipped),
            Err(RecvError::Closed) => bail!("MAVLink link closed"),
        }
    }
}

fn mission_item_int(item: &MissionItem, target_system: u8, target_component: u8) -> MavMessage {
    MavMessage::MISSION_ITEM_INT(MISSION_ITEM_INT_DATA {
        param1: item.param1,
        param2: item.param2,
        param3: item.param3,
        param4: item.param4,
        x: item.x,
        y: item.y,
        z: item.z,
        seq: item.seq,
        command: item.command,
        target_system,
        target_component,
        frame: item.frame,
        current: 0,
        autocontinue: u8::from(item.autocontinue),
        ..Default::default()
    })
}

#[async_trait]
impl DroneConnection for MavlinkLink {
    fn subscribe(&self) -> broadcast::Receiver<ReceivedMessage> {
        self.tx.subscribe()
    }

    async fn arm_disarm(&self, arm: bool) -> Result<()> {
        let param1 = if arm { 1.0 } else { 0.0 };
        self.command(
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            [param1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
        .await
    }

    async fn set_mode(&self, mode: SetMode) -> Result<()> {
        let params = [
            f32::from(mode.base_mode.bits()),
            mode.custom_main_mode as f32,
            mode.custom_sub_mode as f32,
            0.0,
            0.0,
            0.0,
            0.0,
        ];
        let Some(filter) = mode.fail_on_text else {
            return self.command(MavCmd::MAV_CMD_DO_SET_MODE, params).await;
        };

        let mut rx = self.tx.subscribe();
        let mut failure = |message: &MavMessage| match message {
            MavMessage::STATUSTEXT(status) => {
                let text = text_from_bytes(&status.text);
                filter.matches(&text).then_some(text)
            }
            _ => None,
        };
        tokio::select! {
            result = self.command(MavCmd::MAV_CMD_DO_SET_MODE, params) => result,
            text = next_matching(&mut rx, &mut failure) => bail!("Mode change failed: {}", text?),
        }
    }

    async fn clear_mission(&self) -> Result<()> {
        let _transfer = self.transfer.lock().await;
        let mut rx = self.tx.subscribe();
        let request = MavMessage::MISSION_CLEAR_ALL(MISSION_CLEAR_ALL_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
            ..Default::default()
        });
        let result = self
            .exchange(
                &mut rx,
                "MISSION_CLEAR_ALL",
                self.retries,
                |_| request.clone(),
                |message| match message {
                    MavMessage::MISSION_ACK(ack) => Some(ack.mavtype),
                    _ => None,
                },
            )
            .await?;
        if result != MavMissionResult::MAV_MISSION_ACCEPTED {
            bail!("Mission clear rejected: {:?}", result);
        }
        Ok(())
    }

    async fn upload_mission(
        &self,
        items: Vec<MissionItem>,
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<()> {
        let _transfer = self.transfer.lock().await;
        let count = u16::try_from(items.len()).context("mission too long")?;
        let mut rx = self.tx.subscribe();
        progress(0.0);

        let mut last_sent = MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
            count,
            target_system: self.target_system,
            target_component: self.target_component,
            ..Default::default()
        });
        loop {
            let reply = self
                .exchange(
                    &mut rx,
                    "MISSION_UPLOAD",
                    self.retries,
                    |_| last_sent.clone(),
                    |message| match message {
                        MavMessage::MISSION_REQUEST_INT(request) => {
                            Some(MissionReply::Request(request.seq))
                        }
                        MavMessage::MISSION_REQUEST(request) => {
                            Some(MissionReply::Request(request.seq))
                        }
                        MavMessage::MISSION_ACK(ack) => Some(MissionReply::Ack(ack.mavtype)),
                        _ => None,
                    },
                )
                .await?;

            match reply {
                MissionReply::Request(seq) => {
                    let item = items
                        .get(usize::from(seq))
                        .ok_or_else(|| anyhow!("Autopilot requested unknown mission item {}", seq))?;
                    last_sent = mission_item_int(item, self.target_system, self.target_component);
                    progress(f64::from(seq) / f64::from(count));
                }
                MissionReply::Ack(MavMissionResult::MAV_MISSION_ACCEPTED) => {
                    progress(1.0);
                    debug!("Mission of {} items accepted", count);
                    return Ok(());
                }
                MissionReply::Ack(result) => bail!("Mission upload rejected: {:?}", result),
            }
        }
    }

    async fn set_parameters(&self, parameters: Vec<Parameter>) -> Result<()> {
        let _transfer = self.transfer.lock().await;
        for parameter in &parameters {
            self.write_parameter(parameter)
                .await
                .with_context(|| format!("set parameter {}", parameter.id))?;
        }
        Ok(())
    }

    async fn request_parameters(&self, ids: &[&str]) -> Result<Vec<Parameter>> {
        let _transfer = self.transfer.lock().await;
        let mut parameters = Vec::with_capacity(ids.len());
        for id in ids {
            parameters.push(self.read_parameter(id).await?);
        }
        Ok(parameters)
    }

    async fn request_flight_information(&self) -> Result<FLIGHT_INFORMATION_DATA> {
        self.request_message(
            FLIGHT_INFORMATION_DATA::ID,
            0.0,
            "FLIGHT_INFORMATION",
            |message| match message {
                MavMessage::FLIGHT_INFORMATION(info) => Some(info.clone()),
                _ => None,
            },
        )
        .await
    }

    async fn request_storage_information(&self) -> Result<STORAGE_INFORMATION_DATA> {
        // storage id 0 asks for every storage
        self.request_message(
            STORAGE_INFORMATION_DATA::ID,
            0.0,
            "STORAGE_INFORMATION",
            |message| match message {
                MavMessage::STORAGE_INFORMATION(info) => Some(info.clone()),
                _ => None,
            },
        )
        .await
    }
}
