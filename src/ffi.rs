//! C ABI entry point
//!
//! Exposes the conversion as `ogg_transcode_convert(input, output)`, returning
//! 0 on success or the negative status code of the failure point.

use std::ffi::{c_char, c_int, CStr};
use std::path::Path;

use crate::error::TranscodeError;

fn path_arg<'a>(ptr: *const c_char, name: &str) -> Result<&'a Path, TranscodeError> {
    if ptr.is_null() {
        return Err(TranscodeError::InvalidPath(format!("{} path is null", name)));
    }
    // SAFETY: the caller guarantees a NUL-terminated string that stays valid
    // for the duration of the call.
    let s = unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| TranscodeError::InvalidPath(format!("{} path is not UTF-8", name)))?;
    Ok(Path::new(s))
}

/// Convert the first audio stream of `input` into an OGG/Vorbis file at
/// `output`.
///
/// # Safety
///
/// `input` and `output` must each be null or point to a NUL-terminated
/// string valid for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn ogg_transcode_convert(
    input: *const c_char,
    output: *const c_char,
) -> c_int {
    let result = path_arg(input, "input")
        .and_then(|input| Ok((input, path_arg(output, "output")?)))
        .and_then(|(input, output)| {
            crate::ffmpeg_utils::init()?;
            crate::transcode(input, output)
        });
    match result {
        Ok(_) => 0,
        Err(e) => e.code(),
    }
}
