use crate::control::ControlRequest;
use crate::pool::SessionPool;
use crate::session::Session;
use libcapture_tools::*;
use std::sync::Arc;
use tracing::{debug, warn};

/// Parameters of an open request
#[derive(Clone, Debug, Default)]
pub struct OpenRequest {
    /// Sub-resource path appended to the device name. Must be empty.
    pub path: String,
    /// Whether the request was issued from the caller's own context
    pub from_issuing_thread: bool,
}

impl OpenRequest {
    pub fn new() -> Self {
        OpenRequest {
            path: String::new(),
            from_issuing_thread: true,
        }
    }
}

/// Instance handle: holds the session once opened
#[derive(Default)]
pub struct FileObject {
    session: Option<Arc<Session>>,
}

impl FileObject {
    pub fn new() -> Self {
        FileObject::default()
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }
}

/// I/O request routed by [`ReadInterface::dispatch`]
#[derive(Debug)]
pub enum Request<'a> {
    Create(OpenRequest),
    Read(&'a mut [u8]),
    Control(ControlRequest<'a>),
    Close,
}

/// The read interface: creates sessions and routes requests to them
pub struct ReadInterface {
    queue: Arc<dyn BlockQueue>,
    pool: Arc<SessionPool>,
    config: Config,
}

impl ReadInterface {
    pub fn new(queue: Arc<dyn BlockQueue>, config: &Config) -> Self {
        let pool = SessionPool::new(config.pool_capacity(), config.max_sessions());
        ReadInterface {
            queue,
            pool: Arc::new(pool),
            config: config.clone(),
        }
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Open a new session
    pub fn open(&self, request: &OpenRequest) -> Result<Session, Error> {
        if !request.from_issuing_thread {
            warn!("open request not issued from the caller context");
            return Err(Error::AccessDenied);
        }
        if !request.path.is_empty() {
            warn!("open request for sub-resource '{}'", request.path);
            return Err(Error::NotFound(request.path.clone()));
        }
        Session::open(self.queue.clone(), self.pool.clone(), &self.config)
    }

    /// Route a request to the session attached to `file`
    ///
    /// Returns the number of bytes read, or written to the control output.
    pub fn dispatch(&self, file: &mut FileObject, request: Request<'_>) -> Result<usize, Error> {
        match request {
            Request::Create(open) => {
                if file.session.is_some() {
                    return Err(Error::InvalidParameter("file object already open"));
                }
                let session = self.open(&open)?;
                file.session = Some(Arc::new(session));
                Ok(0)
            }
            Request::Read(buf) => {
                let session = file.session.as_ref().ok_or(Error::InvalidParameter("no session"))?;
                Ok(session.read(buf))
            }
            Request::Control(control) => {
                let session = file.session.as_ref().ok_or(Error::InvalidParameter("no session"))?;
                session.control(control)
            }
            Request::Close => {
                let session = file.session.take().ok_or(Error::InvalidParameter("no session"))?;
                debug!("closing reader {}", session.reader_id());
                // other handles may still hold the session; the last one closes it
                drop(session);
                Ok(0)
            }
        }
    }
}
