//! Candidate capture-source discovery.

use tracing::debug;

use crate::control::{CaptureControl, CaptureInput, GAME_CAPTURE_KIND};
use crate::errors::CaptureError;
use crate::title::WindowTitle;

const WINDOW_CAPTURE_MODE: &str = "window";

/// Window-capture inputs currently pointed at a playback window, by name.
///
/// Fails if any input's settings cannot be fetched.
pub async fn discover_inputs<C>(control: &C) -> Result<Vec<CaptureInput>, CaptureError>
where
    C: CaptureControl + ?Sized,
{
    let inputs = control.list_inputs(GAME_CAPTURE_KIND).await?;
    let mut found = Vec::with_capacity(inputs.len());

    for input in inputs {
        let settings = control.get_input_settings(&input.uuid).await?;
        let Some(window) = settings.window else {
            continue;
        };
        if settings.capture_mode.as_deref() != Some(WINDOW_CAPTURE_MODE)
            || !WindowTitle::parse(&window).is_playback()
        {
            debug!(uuid = %input.uuid, window = %window, "skipping non-playback input");
            continue;
        }
        found.push(CaptureInput {
            uuid: input.uuid,
            name: input.name,
            window,
        });
    }

    found.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.uuid.cmp(&b.uuid)));
    debug!(count = found.len(), "discovered playback inputs");
    Ok(found)
}
