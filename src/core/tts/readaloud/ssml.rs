//! SSML document builder.
//!
//! ```xml
//! <speak version="1.0" xmlns="http://www.w3.org/2001/10/synthesis"
//!        xmlns:mstts="https://www.w3.org/2001/mstts" xml:lang="en-US">
//!   <voice name="en-US-AriaNeural">
//!     <prosody pitch="5%" rate="20%" volume="100%">
//!       <mstts:express-as style="cheerful" styledegree="0.50">text</mstts:express-as>
//!     </prosody>
//!   </voice>
//! </speak>
//! ```
//!
//! The `express-as` wrapper is only emitted when a non-neutral style or role
//! is requested; some voices reject a no-op wrapper.

use crate::core::cache::escape_xml;
use crate::core::tts::base::SpeechSettings;

const MIN_STYLE_DEGREE: f32 = 0.01;
const MAX_STYLE_DEGREE: f32 = 1.0;

/// Prosody rate offset in percent: `speed - 100`.
#[inline]
pub fn rate_percent(speed: i32) -> i32 {
    speed - 100
}

/// Prosody pitch offset in percent: `(pitch - 100) / 2`.
#[inline]
pub fn pitch_percent(pitch: i32) -> i32 {
    (pitch - 100) / 2
}

/// Volume clamped into the accepted `[1, 100]` range.
#[inline]
pub fn volume_percent(volume: i32) -> i32 {
    volume.clamp(1, 100)
}

/// Style degree in `[0.01, 1.0]` from a 1-100 intensity (minimum numerator 1).
pub fn style_degree(intensity: u32) -> f32 {
    (intensity.max(1) as f32 / 100.0).clamp(MIN_STYLE_DEGREE, MAX_STYLE_DEGREE)
}

/// Wraps escaped text in `mstts:express-as` when a style or role is active.
fn expressive_body(escaped_text: &str, settings: &SpeechSettings) -> String {
    let style = settings.effective_style();
    let role = settings.effective_role();
    if style.is_none() && role.is_none() {
        return escaped_text.to_string();
    }

    let mut body = String::with_capacity(escaped_text.len() + 96);
    body.push_str("<mstts:express-as");
    if let Some(style) = style {
        body.push_str(" style=\"");
        body.push_str(&escape_xml(style));
        body.push('"');
        let degree = style_degree(settings.style_intensity.unwrap_or(100));
        body.push_str(&format!(" styledegree=\"{degree:.2}\""));
    }
    if let Some(role) = role {
        body.push_str(" role=\"");
        body.push_str(&escape_xml(role));
        body.push('"');
    }
    body.push('>');
    body.push_str(escaped_text);
    body.push_str("</mstts:express-as>");
    body
}

/// Renders the SSML document for already-escaped text.
///
/// Voice, style and role are escaped here since they land in attributes.
pub fn build_ssml(escaped_text: &str, settings: &SpeechSettings) -> String {
    let body = expressive_body(escaped_text, settings);

    format!(
        "<speak version=\"1.0\" xmlns=\"http://www.w3.org/2001/10/synthesis\" \
         xmlns:mstts=\"https://www.w3.org/2001/mstts\" xml:lang=\"en-US\">\
         <voice name=\"{voice}\">\
         <prosody pitch=\"{pitch}%\" rate=\"{rate}%\" volume=\"{volume}%\">{body}</prosody>\
         </voice></speak>",
        voice = escape_xml(&settings.voice),
        pitch = pitch_percent(settings.pitch),
        rate = rate_percent(settings.speed),
        volume = volume_percent(settings.volume),
    )
}
