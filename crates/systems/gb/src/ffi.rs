//! Flat C ABI over [`GbSystem`].
//!
//! Every function takes the opaque handle returned by [`gb_create`]. A null
//! handle is rejected with the call's failure value (`false`, `0` or null).
//! Buffers are described by a pointer plus the caller's capacity in bytes;
//! nothing is ever written past that capacity.

use std::slice;

use emu_core::System;

use crate::{GbSystem, CAMERA_IMAGE_BYTES, FRAME_BUFFER_BYTES, SCREEN_HEIGHT, SCREEN_WIDTH};

/// # Safety
/// `h` must be null or a handle from `gb_create` that was not destroyed.
unsafe fn system<'a>(h: *const GbSystem) -> Option<&'a GbSystem> {
    h.as_ref()
}

/// # Safety
/// As for [`system`], with no other live reference to the handle.
unsafe fn system_mut<'a>(h: *mut GbSystem) -> Option<&'a mut GbSystem> {
    h.as_mut()
}

/// # Safety
/// `data` must be null or valid for `len` reads.
unsafe fn input<'a>(data: *const u8, len: usize) -> Option<&'a [u8]> {
    if data.is_null() {
        None
    } else {
        Some(slice::from_raw_parts(data, len))
    }
}

/// Copy `src` into the caller's buffer if it fits; returns bytes written.
///
/// # Safety
/// `out` must be null or valid for `cap` writes.
unsafe fn copy_out(src: &[u8], out: *mut u8, cap: usize) -> usize {
    if out.is_null() || src.is_empty() || src.len() > cap {
        return 0;
    }
    slice::from_raw_parts_mut(out, src.len()).copy_from_slice(src);
    src.len()
}

#[no_mangle]
pub extern "C" fn gb_create() -> *mut GbSystem {
    Box::into_raw(Box::new(GbSystem::new()))
}

/// # Safety
/// `h` must be null or a live handle; it is invalid afterwards.
#[no_mangle]
pub unsafe extern "C" fn gb_destroy(h: *mut GbSystem) {
    if !h.is_null() {
        drop(Box::from_raw(h));
    }
}

/// # Safety
/// `h` is a live handle or null; `data` is valid for `len` reads.
#[no_mangle]
pub unsafe extern "C" fn gb_load_rom(h: *mut GbSystem, data: *const u8, len: usize) -> bool {
    match (system_mut(h), input(data, len)) {
        (Some(sys), Some(rom)) => sys.load_rom(rom).is_ok(),
        _ => false,
    }
}

/// # Safety
/// `h` is a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn gb_step_frame(h: *mut GbSystem) -> bool {
    system_mut(h).is_some_and(|sys| sys.step_frame().is_ok())
}

/// # Safety
/// `h` is a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn gb_frame_count(h: *const GbSystem) -> u64 {
    system(h).map_or(0, |sys| sys.frame_count())
}

/// Pointer to the RGBA frame; valid until the next call on the handle.
///
/// # Safety
/// `h` is a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn gb_frame_buffer(h: *const GbSystem) -> *const u8 {
    system(h).map_or(std::ptr::null(), |sys| sys.frame_buffer().as_ptr())
}

#[no_mangle]
pub extern "C" fn gb_frame_buffer_size() -> usize {
    FRAME_BUFFER_BYTES
}

#[no_mangle]
pub extern "C" fn gb_screen_width() -> u32 {
    SCREEN_WIDTH as u32
}

#[no_mangle]
pub extern "C" fn gb_screen_height() -> u32 {
    SCREEN_HEIGHT as u32
}

/// # Safety
/// `h` is a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn gb_set_button(h: *mut GbSystem, index: u8, pressed: bool) -> bool {
    system_mut(h).is_some_and(|sys| sys.set_button(index, pressed))
}

/// # Safety
/// `h` is a live handle or null; `data` is valid for `len` reads.
#[no_mangle]
pub unsafe extern "C" fn gb_set_camera_image(
    h: *mut GbSystem,
    data: *const u8,
    len: usize,
) -> bool {
    match (system_mut(h), input(data, len)) {
        (Some(sys), Some(image)) => sys.set_camera_image(image),
        _ => false,
    }
}

/// # Safety
/// `h` is a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn gb_is_camera(h: *const GbSystem) -> bool {
    system(h).is_some_and(|sys| sys.is_camera_cartridge())
}

/// # Safety
/// `h` is a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn gb_camera_ready(h: *const GbSystem) -> bool {
    system(h).is_some_and(|sys| sys.is_camera_ready())
}

/// # Safety
/// `h` is a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn gb_trigger_capture(h: *mut GbSystem) -> bool {
    system_mut(h).is_some_and(|sys| sys.trigger_camera_capture())
}

/// # Safety
/// `h` is a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn gb_update_camera_live(h: *mut GbSystem) -> bool {
    system_mut(h).is_some_and(|sys| sys.update_camera_live())
}

/// Pointer to the 128x112 RGBA live view, or null without a camera.
///
/// # Safety
/// `h` is a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn gb_camera_live_buffer(h: *const GbSystem) -> *const u8 {
    system(h)
        .and_then(|sys| sys.camera_live_buffer())
        .map_or(std::ptr::null(), |buf| buf.as_ptr())
}

#[no_mangle]
pub extern "C" fn gb_camera_live_buffer_size() -> usize {
    CAMERA_IMAGE_BYTES
}

/// Returns bytes written: the full image size, or 0 for an empty or invalid
/// slot or a buffer that is too small.
///
/// # Safety
/// `h` is a live handle or null; `out` is valid for `cap` writes.
#[no_mangle]
pub unsafe extern "C" fn gb_decode_camera_photo(
    h: *const GbSystem,
    slot: u8,
    out: *mut u8,
    cap: usize,
) -> usize {
    match system(h).and_then(|sys| sys.decode_camera_photo(slot)) {
        Some(image) => copy_out(&image, out, cap),
        None => 0,
    }
}

/// # Safety
/// `h` is a live handle or null; `data` is valid for `len` reads.
#[no_mangle]
pub unsafe extern "C" fn gb_encode_camera_photo(
    h: *mut GbSystem,
    slot: u8,
    data: *const u8,
    len: usize,
) -> bool {
    match (system_mut(h), input(data, len)) {
        (Some(sys), Some(rgba)) => sys.encode_camera_photo(slot, rgba),
        _ => false,
    }
}

/// # Safety
/// `h` is a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn gb_clear_camera_photo(h: *mut GbSystem, slot: u8) -> bool {
    system_mut(h).is_some_and(|sys| sys.clear_camera_photo(slot))
}

/// # Safety
/// `h` is a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn gb_camera_photo_count(h: *const GbSystem) -> u32 {
    system(h).map_or(0, |sys| sys.camera_photo_count() as u32)
}

/// # Safety
/// `h` is a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn gb_get_camera_exposure(h: *const GbSystem) -> u16 {
    system(h).map_or(0, |sys| sys.camera_exposure())
}

/// # Safety
/// `h` is a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn gb_set_camera_exposure(h: *mut GbSystem, exposure: i32) -> bool {
    system_mut(h).is_some_and(|sys| sys.set_camera_exposure(exposure))
}

/// # Safety
/// `h` is a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn gb_get_camera_contrast(h: *const GbSystem) -> u8 {
    system(h).map_or(0, |sys| sys.camera_contrast())
}

/// # Safety
/// `h` is a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn gb_read_memory(h: *const GbSystem, addr: u16) -> u8 {
    system(h).map_or(0xFF, |sys| sys.read_memory(addr))
}

/// # Safety
/// `h` is a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn gb_save_data_size(h: *const GbSystem) -> usize {
    system(h).map_or(0, |sys| sys.save_data_size())
}

/// # Safety
/// `h` is a live handle or null; `out` is valid for `cap` writes.
#[no_mangle]
pub unsafe extern "C" fn gb_get_save_data(h: *const GbSystem, out: *mut u8, cap: usize) -> usize {
    system(h).map_or(0, |sys| copy_out(sys.save_data(), out, cap))
}

/// # Safety
/// `h` is a live handle or null; `data` is valid for `len` reads.
#[no_mangle]
pub unsafe extern "C" fn gb_load_save_data(h: *mut GbSystem, data: *const u8, len: usize) -> bool {
    match (system_mut(h), input(data, len)) {
        (Some(sys), Some(blob)) => sys.load_save_data(blob).is_ok(),
        _ => false,
    }
}
