use tracing::{debug, warn};

use crate::command::{Request, Response};
use crate::{KvsEngine, KvsError};

/// Turns command lines into operations on a [`KvsEngine`] and their results into response lines.
///
/// The processor keeps no state between commands. Every failure that concerns a single command
/// (an unknown command, a missing key, a rejected value) becomes a [`Response`]; nothing here
/// returns an error to the transport.
#[derive(Debug, Clone)]
pub struct Processor<E: KvsEngine> {
    engine: E,
}

impl<E: KvsEngine> Processor<E> {
    /// creates a processor that runs commands against `engine`
    pub fn new(engine: E) -> Self {
        Processor { engine }
    }

    /// the engine commands are run against
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// parses and executes one command line
    pub fn process(&self, line: &str) -> Response {
        match Request::parse(line) {
            Ok(req) => self.execute(req),
            Err(e) => {
                debug!("rejecting {:?}: {}", line, e);
                Response::UnknownCommand
            }
        }
    }

    /// executes one parsed request
    pub fn execute(&self, req: Request) -> Response {
        match req {
            Request::Create { key, value } => match self.engine.set(key.clone(), value) {
                Ok(()) => Response::Created { key },
                Err(e) => Response::Rejected(e.to_string()),
            },
            Request::Update { key, value } => match self.engine.set(key.clone(), value) {
                Ok(()) => Response::Updated { key },
                Err(e) => Response::Rejected(e.to_string()),
            },
            Request::Read { key } => match self.engine.get(key.clone()) {
                Ok(Some(value)) => Response::Read { key, value },
                Ok(None) => Response::NotFound { key },
                Err(e) => Response::Rejected(e.to_string()),
            },
            Request::Delete { key } => match self.engine.remove(key.clone()) {
                Ok(()) => Response::Deleted { key },
                Err(KvsError::KeyNotFound) => Response::NotFound { key },
                Err(e) => Response::Rejected(e.to_string()),
            },
        }
    }

    /// processes `line` and renders the result line. A result longer than `max_len` bytes is
    /// replaced by an error line rather than truncated.
    pub fn respond(&self, line: &str, max_len: usize) -> String {
        let text = self.process(line).to_string();
        if text.len() > max_len {
            let err = KvsError::MessageTooLong {
                len: text.len(),
                max: max_len,
            };
            warn!("response to {:?} does not fit: {}", line, err);
            Response::Rejected(err.to_string()).to_string()
        } else {
            text
        }
    }
}
