use serde::de::DeserializeOwned;
use serde_wasm_bindgen::from_value;
use std::fmt;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{console, Request, RequestInit, RequestMode, Response};

/// What went wrong while retrieving one endpoint. Failures stay local to the
/// request that produced them; callers log and move on.
#[derive(Debug)]
pub enum FetchError {
    /// The request never produced a usable response.
    Request(String),
    /// The endpoint answered with a non-success status.
    Status { path: String, status: u16 },
    /// The body was not valid JSON of the expected shape.
    Decode { path: String, detail: String },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Request(detail) => write!(f, "request failed: {detail}"),
            FetchError::Status { path, status } => {
                write!(f, "{path} returned status {status}")
            }
            FetchError::Decode { path, detail } => {
                write!(f, "could not decode {path}: {detail}")
            }
        }
    }
}

pub fn log(message: &str) {
    console::log_1(&JsValue::from_str(message));
}

pub async fn fetch_json<T>(path: &str) -> Result<T, FetchError>
where
    T: DeserializeOwned,
{
    let window =
        web_sys::window().ok_or_else(|| FetchError::Request("window unavailable".to_string()))?;

    let opts = RequestInit::new();
    opts.set_method("GET");
    opts.set_mode(RequestMode::SameOrigin);

    let request = Request::new_with_str_and_init(path, &opts)
        .map_err(|err| FetchError::Request(describe_js_error(err)))?;
    let response_value = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(|err| FetchError::Request(describe_js_error(err)))?;
    let response: Response = response_value
        .dyn_into()
        .map_err(|_| FetchError::Request("response object of unexpected type".to_string()))?;

    if !response.ok() {
        return Err(FetchError::Status {
            path: path.to_string(),
            status: response.status(),
        });
    }

    let json_future = response.json().map_err(|err| FetchError::Decode {
        path: path.to_string(),
        detail: describe_js_error(err),
    })?;
    let json = JsFuture::from(json_future)
        .await
        .map_err(|err| FetchError::Decode {
            path: path.to_string(),
            detail: describe_js_error(err),
        })?;
    from_value(json).map_err(|err| FetchError::Decode {
        path: path.to_string(),
        detail: err.to_string(),
    })
}

fn describe_js_error(err: JsValue) -> String {
    if let Some(value) = err.as_string() {
        value
    } else {
        format!("{err:?}")
    }
}
