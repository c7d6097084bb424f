//! End-to-end checks against hand-assembled cartridge images.

use emu_core::System;
use emu_gb::{GbError, GbSystem, CAMERA_IMAGE_BYTES, FRAME_BUFFER_BYTES};

const ENTRY: usize = 0x0100;
/// JR -2
const SPIN: [u8; 2] = [0x18, 0xFE];

/// Cartridge image with `program` at the entry point and a valid header.
fn cartridge(cart_type: u8, rom_code: u8, ram_code: u8, program: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000 << rom_code];
    rom[ENTRY..ENTRY + program.len()].copy_from_slice(program);
    rom[0x0134..0x0138].copy_from_slice(b"DEMO");
    rom[0x0147] = cart_type;
    rom[0x0148] = rom_code;
    rom[0x0149] = ram_code;
    rom[0x014D] = rom[0x0134..0x014D]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1));
    rom
}

fn loaded(rom: &[u8]) -> GbSystem {
    let mut sys = GbSystem::new();
    sys.load_rom(rom).unwrap();
    sys
}

fn camera() -> GbSystem {
    loaded(&cartridge(0xFC, 0, 0, &SPIN))
}

fn gradient_rgba() -> Vec<u8> {
    let mut rgba = Vec::with_capacity(CAMERA_IMAGE_BYTES);
    for _y in 0..112 {
        for x in 0..128u32 {
            let v = (x * 2) as u8;
            rgba.extend_from_slice(&[v, v, v, 0xFF]);
        }
    }
    rgba
}

fn mean(rgba: &[u8]) -> u32 {
    let sum: u64 = rgba.chunks_exact(4).map(|px| px[0] as u64).sum();
    (sum / (rgba.len() / 4) as u64) as u32
}

#[test]
fn entry_point_is_readable_before_first_frame() {
    let mut program = SPIN.to_vec();
    program[0] = 0x42;
    let sys = loaded(&cartridge(0x00, 0, 0, &program));
    assert_eq!(sys.read_memory(0x0100), 0x42);
    assert_eq!(sys.frame_count(), 0);
}

#[test]
fn frame_counter_advances_once_per_frame() {
    let mut sys = loaded(&cartridge(0x00, 0, 0, &SPIN));
    for n in 1..=5 {
        sys.step_frame().unwrap();
        assert_eq!(sys.frame_count(), n);
        assert_eq!(sys.frame_buffer().len(), FRAME_BUFFER_BYTES);
    }
}

#[test]
fn button_state_is_sampled_each_frame() {
    // Select the action group, then copy P1 to 0xC000 forever.
    let program = [
        0x3E, 0x10, // LD A,0x10
        0xE0, 0x00, // LDH (0x00),A
        0xF0, 0x00, // loop: LDH A,(0x00)
        0xEA, 0x00, 0xC0, // LD (0xC000),A
        0x18, 0xF9, // JR loop
    ];
    let mut sys = loaded(&cartridge(0x00, 0, 0, &program));

    assert!(sys.set_button(0, true));
    sys.step_frame().unwrap();
    assert_eq!(sys.read_memory(0xC000) & 0x0F, 0x0E);

    assert!(sys.set_button(0, false));
    sys.step_frame().unwrap();
    assert_eq!(sys.read_memory(0xC000) & 0x0F, 0x0F);
}

#[test]
fn out_of_range_bank_wraps() {
    let program = [
        0x3E, 99, // LD A,99
        0xEA, 0x00, 0x20, // LD (0x2000),A
        0x18, 0xFE, // JR -2
    ];
    // Four banks: 99 mod 4 selects bank 3.
    let mut rom = cartridge(0x19, 1, 0, &program);
    rom[0x4000] = 0x11;
    rom[0xC000] = 0x5A;
    let mut sys = loaded(&rom);
    assert_eq!(sys.read_memory(0x4000), 0x11);
    sys.step_frame().unwrap();
    assert_eq!(sys.read_memory(0x4000), 0x5A);

    // Two banks: 99 mod 2 selects bank 1.
    let mut rom = cartridge(0x19, 0, 0, &program);
    rom[0x4000] = 0x33;
    let mut sys = loaded(&rom);
    sys.step_frame().unwrap();
    assert_eq!(sys.read_memory(0x4000), 0x33);
}

#[test]
fn battery_ram_round_trips() {
    let program = [
        0x3E, 0x0A, // LD A,0x0A
        0xEA, 0x00, 0x00, // LD (0x0000),A  enable RAM
        0x3E, 0x77, // LD A,0x77
        0xEA, 0x00, 0xA0, // LD (0xA000),A
        0x18, 0xFE,
    ];
    let mut sys = loaded(&cartridge(0x13, 0, 0x03, &program));
    assert_eq!(sys.save_data_size(), 0x8000);

    let blob: Vec<u8> = (0..0x8000u32).map(|i| (i * 7) as u8).collect();
    sys.load_save_data(&blob).unwrap();
    assert_eq!(sys.save_data(), &blob[..]);
    assert_eq!(sys.save_data(), sys.save_data());

    sys.step_frame().unwrap();
    assert_eq!(sys.save_data()[0], 0x77);
    assert_eq!(sys.save_data()[1..], blob[1..]);

    assert!(matches!(
        sys.load_save_data(&blob[..100]),
        Err(GbError::SaveSizeMismatch { .. })
    ));
    assert_eq!(sys.save_data()[0], 0x77);
}

#[test]
fn clock_cartridge_saves_its_clock() {
    let program = [
        0x3E, 0x0A, // LD A,0x0A
        0xEA, 0x00, 0x00, // LD (0x0000),A  enable RAM and clock
        0x3E, 0x08, // LD A,0x08
        0xEA, 0x00, 0x40, // LD (0x4000),A  select seconds
        0x3E, 30, // LD A,30
        0xEA, 0x00, 0xA0, // LD (0xA000),A
        0x18, 0xFE,
    ];
    let rom = cartridge(0x10, 0, 0x02, &program);
    let mut sys = loaded(&rom);
    let ram = 0x2000;
    assert_eq!(sys.save_data_size(), ram + 48);

    // About a second and a half of emulated time.
    for _ in 0..90 {
        sys.step_frame().unwrap();
    }
    let save = sys.save_data().to_vec();
    assert_eq!(save[ram..ram + 4], [31, 0, 0, 0]);

    let mut other = loaded(&cartridge(0x10, 0, 0x02, &SPIN));
    other.load_save_data(&save).unwrap();
    assert_eq!(other.save_data(), &save[..]);
}

#[test]
fn serial_bytes_are_collected() {
    let program = [
        0x3E, b'H', 0xE0, 0x01, // LD A,'H'; LDH (0x01),A
        0x3E, 0x81, 0xE0, 0x02, // LD A,0x81; LDH (0x02),A
        0x3E, b'i', 0xE0, 0x01,
        0x3E, 0x81, 0xE0, 0x02,
        0x18, 0xFE,
    ];
    let mut sys = loaded(&cartridge(0x00, 0, 0, &program));
    sys.step_frame().unwrap();
    assert_eq!(sys.serial_output(), b"Hi");
}

#[test]
fn rejected_rom_leaves_machine_alone() {
    let mut sys = loaded(&cartridge(0x00, 0, 0, &SPIN));
    sys.step_frame().unwrap();
    let before = sys.save_state();

    assert!(matches!(sys.load_rom(&[]), Err(GbError::Cartridge(_))));
    assert!(sys.load_rom(&[0u8; 0x100]).is_err());
    assert!(sys.load_rom(&cartridge(0xBE, 0, 0, &SPIN)).is_err());

    assert_eq!(sys.save_state(), before);
    assert_eq!(sys.title(), Some("DEMO"));
    assert_eq!(sys.frame_count(), 1);
}

#[test]
fn empty_photo_slot_decodes_to_nothing() {
    let sys = camera();
    assert!(sys.is_camera_cartridge());
    assert_eq!(sys.camera_photo_count(), 0);
    for slot in 1..=30 {
        assert_eq!(sys.decode_camera_photo(slot), None);
    }
    assert_eq!(sys.decode_camera_photo(31), None);
}

#[test]
fn encoded_photos_decode_deterministically() {
    let mut sys = camera();
    let image = gradient_rgba();
    assert!(sys.encode_camera_photo(5, &image));
    assert!(sys.encode_camera_photo(6, &image));
    assert_eq!(sys.camera_photo_count(), 2);

    let first = sys.decode_camera_photo(5).unwrap();
    assert_eq!(first.len(), CAMERA_IMAGE_BYTES);
    assert_eq!(sys.decode_camera_photo(5).unwrap(), first);
    assert_eq!(sys.decode_camera_photo(6).unwrap(), first);
    assert!(first
        .chunks_exact(4)
        .all(|px| matches!(px[0], 0xFF | 0xAA | 0x55 | 0x00) && px[3] == 0xFF));

    // Left half of the gradient is darker than the right half.
    let row_bytes = 128 * 4;
    let (mut left, mut right) = (Vec::new(), Vec::new());
    for row in first.chunks_exact(row_bytes) {
        left.extend_from_slice(&row[..row_bytes / 2]);
        right.extend_from_slice(&row[row_bytes / 2..]);
    }
    assert!(mean(&left) < mean(&right));
    assert!(mean(&first).abs_diff(mean(&image)) <= 0x10);

    assert!(sys.encode_camera_photo(7, &first));
    assert_eq!(sys.decode_camera_photo(7).unwrap(), first);
    assert!(sys.clear_camera_photo(7));

    assert!(sys.clear_camera_photo(5));
    assert!(!sys.clear_camera_photo(5));
    assert_eq!(sys.decode_camera_photo(5), None);
    assert_eq!(sys.camera_photo_count(), 1);
}

#[test]
fn flat_shades_keep_their_brightness() {
    let mut sys = camera();
    for (slot, level) in [(1, 0x00u8), (2, 0x55), (3, 0xAA), (4, 0xFF)] {
        let image = [level, level, level, 0xFF].repeat(128 * 112);
        assert!(sys.encode_camera_photo(slot, &image));
        let decoded = sys.decode_camera_photo(slot).unwrap();
        assert_eq!(decoded, image, "level {level:#04x}");

        // Decoded photos re-encode to themselves.
        assert!(sys.encode_camera_photo(slot, &decoded));
        assert_eq!(sys.decode_camera_photo(slot).unwrap(), decoded);
    }

    let grey = [0x80, 0x80, 0x80, 0xFF].repeat(128 * 112);
    assert!(sys.encode_camera_photo(5, &grey));
    let decoded = sys.decode_camera_photo(5).unwrap();
    assert!(mean(&decoded).abs_diff(0x80) <= 0x10);
}

#[test]
fn invalid_encode_writes_nothing() {
    let mut sys = camera();
    let save = sys.save_data().to_vec();
    assert!(!sys.encode_camera_photo(0, &gradient_rgba()));
    assert!(!sys.encode_camera_photo(31, &gradient_rgba()));
    assert!(!sys.encode_camera_photo(1, &[0u8; 16]));
    assert_eq!(sys.save_data(), &save[..]);
}

#[test]
fn host_capture_feeds_live_view() {
    let mut sys = camera();
    assert!(!sys.is_camera_ready());
    assert!(!sys.set_camera_image(&[0u8; 10]));

    let image: Vec<u8> = (0..128 * 112).map(|i| (i % 128 * 2) as u8).collect();
    assert!(sys.set_camera_image(&image));
    assert!(sys.is_camera_ready());

    assert!(!sys.update_camera_live());
    assert!(sys.trigger_camera_capture());
    assert!(sys.update_camera_live());
    assert!(!sys.update_camera_live());

    let live = sys.camera_live_buffer().unwrap().to_vec();
    assert_eq!(live.len(), CAMERA_IMAGE_BYTES);
    assert_eq!(sys.decode_camera_photo(0).unwrap(), live);
}

#[test]
fn exposure_drives_contrast() {
    let mut sys = camera();
    assert!(sys.set_camera_exposure(0x1000));
    assert_eq!(sys.camera_exposure(), 0x1000);
    assert_eq!(sys.camera_contrast(), 9);
    assert!(sys.set_camera_exposure(0));
    assert_eq!(sys.camera_contrast(), 5);
    assert!(sys.set_camera_exposure(0x7FFF_FFFF));
    assert_eq!(sys.camera_exposure(), 0xFFFF);
    assert_eq!(sys.camera_contrast(), 15);
}

#[test]
fn camera_ram_survives_save_reload() {
    let mut sys = camera();
    assert!(sys.encode_camera_photo(2, &gradient_rgba()));
    let save = sys.save_data().to_vec();
    let photo = sys.decode_camera_photo(2).unwrap();

    let mut other = camera();
    other.load_save_data(&save).unwrap();
    assert_eq!(other.camera_photo_count(), 1);
    assert_eq!(other.decode_camera_photo(2).unwrap(), photo);
}
