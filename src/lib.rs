pub mod channel;
pub mod fetch;
pub mod page;
pub mod render;

use crate::channel::{Channel, ReleaseRecord};
use crate::page::DomPage;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();

    let page = Rc::new(DomPage::new()?);
    for channel in Channel::ALL {
        spawn_local(load_channel(Rc::clone(&page), channel));
    }

    Ok(())
}

/// Fetch one channel's record and render it as soon as it arrives. Channels
/// complete in whatever order the network decides; a failing channel only
/// logs and leaves its subtree untouched.
async fn load_channel(page: Rc<DomPage>, channel: Channel) {
    let record: ReleaseRecord = match fetch::fetch_json(&channel.endpoint()).await {
        Ok(record) => record,
        Err(err) => {
            fetch::log(&format!("Skipping {channel}: {err}"));
            return;
        }
    };

    if let Err(err) = render::render_record(page.as_ref(), &record) {
        fetch::log(&format!("Skipping {channel}: {err}"));
    }
}
