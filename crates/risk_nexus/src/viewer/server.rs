use std::collections::HashSet;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use crate::contagion::{
    NarrativeGenerator, NodeRecord, PropagationFrame, RelationshipFilter,
    SimulationController, SimulationOutcome, SnapshotObserver,
};

use super::protocol::{
    OutcomeSummary, ViewerRequest, ViewerResponse, ViewerStream, VIEWER_PROTOCOL_VERSION,
};

const SERVER_NAME: &str = "risk_nexus";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerServerConfig {
    pub bind_addr: String,
    pub graph_id: String,
}

impl ViewerServerConfig {
    pub fn new(graph_id: impl Into<String>) -> Self {
        Self {
            bind_addr: "127.0.0.1:5010".to_string(),
            graph_id: graph_id.into(),
        }
    }

    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewerServerError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serde error: {0}")]
    Serde(String),
}

impl From<io::Error> for ViewerServerError {
    fn from(err: io::Error) -> Self {
        ViewerServerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ViewerServerError {
    fn from(err: serde_json::Error) -> Self {
        ViewerServerError::Serde(err.to_string())
    }
}

/// Line-delimited JSON server exposing one controller to renderers.
///
/// Every connection gets its own session thread; runs triggered by a session
/// stream frames only to that session.
pub struct ViewerServer<N: NarrativeGenerator> {
    config: ViewerServerConfig,
    controller: Arc<SimulationController<N>>,
}

impl<N> ViewerServer<N>
where
    N: NarrativeGenerator + Send + Sync + 'static,
{
    pub fn new(config: ViewerServerConfig, controller: Arc<SimulationController<N>>) -> Self {
        Self { config, controller }
    }

    pub fn config(&self) -> &ViewerServerConfig {
        &self.config
    }

    pub fn controller(&self) -> &Arc<SimulationController<N>> {
        &self.controller
    }

    pub fn run(&self) -> Result<(), ViewerServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr)?;
        tracing::info!(
            addr = %self.config.bind_addr,
            graph = %self.config.graph_id,
            "viewer server listening"
        );
        self.run_on(listener)
    }

    pub fn run_on(&self, listener: TcpListener) -> Result<(), ViewerServerError> {
        for incoming in listener.incoming() {
            let stream = incoming?;
            let controller = Arc::clone(&self.controller);
            let graph_id = self.config.graph_id.clone();
            thread::spawn(move || {
                let peer = stream
                    .peer_addr()
                    .map(|addr| addr.to_string())
                    .unwrap_or_default();
                tracing::debug!(peer = %peer, "viewer client connected");
                if let Err(err) = serve_stream(stream, controller, graph_id) {
                    tracing::warn!(peer = %peer, error = %err, "viewer session failed");
                }
            });
        }
        Ok(())
    }
}

fn serve_stream<N: NarrativeGenerator>(
    stream: TcpStream,
    controller: Arc<SimulationController<N>>,
    graph_id: String,
) -> Result<(), ViewerServerError> {
    stream.set_nodelay(true)?;
    let reader_stream = stream.try_clone()?;
    let mut writer = BufWriter::new(stream);
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || read_requests(reader_stream, tx));

    let mut session = ViewerSession::new(controller, graph_id);
    while let Ok(incoming) = rx.recv() {
        match incoming {
            Ok(request) => session.handle_request(request, &mut writer)?,
            Err(message) => send_response(&mut writer, &ViewerResponse::Error { message })?,
        }
    }
    Ok(())
}

struct ViewerSession<N: NarrativeGenerator> {
    controller: Arc<SimulationController<N>>,
    graph_id: String,
    subscribed: HashSet<ViewerStream>,
    filter: RelationshipFilter,
}

impl<N: NarrativeGenerator> ViewerSession<N> {
    fn new(controller: Arc<SimulationController<N>>, graph_id: String) -> Self {
        Self {
            controller,
            graph_id,
            subscribed: HashSet::new(),
            filter: RelationshipFilter::All,
        }
    }

    /// No subscription means every stream.
    fn wants(&self, stream: ViewerStream) -> bool {
        self.subscribed.is_empty() || self.subscribed.contains(&stream)
    }

    fn handle_request<W: Write>(
        &mut self,
        request: ViewerRequest,
        writer: &mut W,
    ) -> Result<(), ViewerServerError> {
        match request {
            ViewerRequest::Hello { client, version } => {
                tracing::debug!(client = %client, version, "viewer hello");
                send_response(
                    writer,
                    &ViewerResponse::HelloAck {
                        server: SERVER_NAME.to_string(),
                        version: VIEWER_PROTOCOL_VERSION,
                        graph_id: self.graph_id.clone(),
                    },
                )?;
                if version != VIEWER_PROTOCOL_VERSION {
                    send_response(
                        writer,
                        &ViewerResponse::Error {
                            message: format!(
                                "client protocol version {version} differs from server version {VIEWER_PROTOCOL_VERSION}"
                            ),
                        },
                    )?;
                }
            }
            ViewerRequest::Subscribe { streams } => {
                self.subscribed = streams.into_iter().collect();
            }
            ViewerRequest::SetFilter { filter } => {
                self.filter = filter;
            }
            ViewerRequest::RequestSnapshot => self.send_snapshot(writer)?,
            ViewerRequest::ResolveEntity { entity_id } => {
                let snapshot = self.controller.snapshot();
                let entity = snapshot
                    .model()
                    .entity(&entity_id)
                    .cloned()
                    .map(NodeRecord::from);
                send_response(writer, &ViewerResponse::Entity { entity_id, entity })?;
            }
            ViewerRequest::Trigger { entity_id } => self.handle_trigger(&entity_id, writer)?,
            ViewerRequest::Reset => {
                self.controller.reset();
                self.send_snapshot(writer)?;
            }
        }
        Ok(())
    }

    fn send_snapshot<W: Write>(&self, writer: &mut W) -> Result<(), ViewerServerError> {
        let snapshot = self.controller.snapshot().filtered_view(self.filter);
        send_response(writer, &ViewerResponse::Snapshot { snapshot })
    }

    fn handle_trigger<W: Write>(
        &mut self,
        entity_id: &str,
        writer: &mut W,
    ) -> Result<(), ViewerServerError> {
        let mut observer = SessionObserver {
            writer: &mut *writer,
            filter: self.filter,
            frames: self.wants(ViewerStream::Frames),
            events: self.wants(ViewerStream::Events),
            outcome: self.wants(ViewerStream::Outcome),
            failure: None,
        };
        let result = self.controller.simulate(entity_id, &mut observer);
        if let Some(err) = observer.failure.take() {
            return Err(err);
        }
        if let Err(err) = result {
            send_response(
                writer,
                &ViewerResponse::Error {
                    message: err.to_string(),
                },
            )?;
        }
        Ok(())
    }
}

/// Streams a run to one session, applying its presentation filter.
struct SessionObserver<'a, W: Write> {
    writer: &'a mut W,
    filter: RelationshipFilter,
    frames: bool,
    events: bool,
    outcome: bool,
    failure: Option<ViewerServerError>,
}

impl<W: Write> SessionObserver<'_, W> {
    fn send(&mut self, response: &ViewerResponse) {
        if self.failure.is_some() {
            return;
        }
        if let Err(err) = send_response(&mut *self.writer, response) {
            self.failure = Some(err);
        }
    }
}

impl<W: Write> SnapshotObserver for SessionObserver<'_, W> {
    fn on_frame(&mut self, frame: &PropagationFrame) {
        if self.frames {
            let mut filtered = frame.clone();
            filtered.snapshot = frame.snapshot.filtered_view(self.filter);
            self.send(&ViewerResponse::Frame { frame: filtered });
        }
        if self.events {
            for event in &frame.events {
                self.send(&ViewerResponse::Event {
                    event: event.clone(),
                });
            }
        }
    }

    fn on_outcome(&mut self, outcome: &SimulationOutcome) {
        if self.outcome {
            self.send(&ViewerResponse::Outcome {
                summary: OutcomeSummary::from(outcome),
            });
        }
    }
}

fn read_requests(stream: TcpStream, tx: mpsc::Sender<Result<ViewerRequest, String>>) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let parsed = serde_json::from_str::<ViewerRequest>(trimmed)
                    .map_err(|err| format!("malformed request: {err}"));
                if tx.send(parsed).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

fn send_response<W: Write>(
    writer: &mut W,
    response: &ViewerResponse,
) -> Result<(), ViewerServerError> {
    serde_json::to_writer(&mut *writer, response)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
