//! Bank switching and RAM gating per controller variant.

mod common;

#[cfg(test)]
mod tests {
    use super::common::{rom_with, tag_banks};
    use dmg_core::{Cartridge, CoreError, MapperKind};

    fn cart(cart_type: u8, rom_code: u8, ram_code: u8) -> Cartridge {
        let mut rom = rom_with(cart_type, rom_code, ram_code, &[]);
        tag_banks(&mut rom);
        Cartridge::from_bytes(rom).unwrap()
    }

    #[test]
    fn rom_only_has_fixed_banks() {
        let mut c = cart(0x00, 0x00, 0x00);
        assert_eq!(c.header.kind, MapperKind::None);
        c.write_control(0x2000, 0x05);
        assert_eq!(c.mapper.rom_bank(), 1);
        assert_eq!(c.read_rom(0x4000), 1);
        assert_eq!(c.read_ram(0xA000), 0xFF);
    }

    #[test]
    fn mbc1_bank_zero_and_thirty_two_advance() {
        let mut c = cart(0x01, 0x05, 0x00); // 64 banks
        c.write_control(0x2000, 0x00);
        assert_eq!(c.mapper.rom_bank(), 1);
        c.write_control(0x2000, 0x20);
        assert_eq!(c.mapper.rom_bank(), 0x21);
        assert_eq!(c.read_rom(0x4000), 0x21);
        c.write_control(0x2000, 0x07);
        assert_eq!(c.read_rom(0x4000), 0x07);
    }

    #[test]
    fn mbc1_high_bits_extend_rom_in_mode_zero() {
        let mut c = cart(0x03, 0x05, 0x03); // 64 banks, 4 RAM banks
        c.write_control(0x2000, 0x02);
        c.write_control(0x4000, 0x01);
        assert_eq!(c.mapper.rom_bank(), 0x22);
        assert_eq!(c.mapper.ram_bank(), 0);
        c.write_control(0x6000, 0x01);
        assert_eq!(c.mapper.rom_bank(), 0x02);
        assert_eq!(c.mapper.ram_bank(), 1);
    }

    #[test]
    fn bank_index_is_masked_by_count() {
        let mut c = cart(0x01, 0x01, 0x00); // 4 banks
        c.write_control(0x2000, 0x06);
        assert_eq!(c.mapper.rom_bank(), 2);
        assert_eq!(c.read_rom(0x4000), 2);
    }

    #[test]
    fn ram_enable_needs_low_nibble_a() {
        let mut c = cart(0x03, 0x00, 0x02);
        c.write_ram(0xA000, 0x42);
        assert_eq!(c.read_ram(0xA000), 0xFF);
        c.write_control(0x0000, 0x1A);
        c.write_ram(0xA000, 0x42);
        assert_eq!(c.read_ram(0xA000), 0x42);
        c.write_control(0x0000, 0x0B);
        assert_eq!(c.read_ram(0xA000), 0xFF);
        c.write_control(0x0000, 0x0A);
        assert_eq!(c.read_ram(0xA000), 0x42);
    }

    #[test]
    fn mbc2_nibble_ram() {
        let mut c = cart(0x06, 0x02, 0x00);
        assert_eq!(c.header.ram_banks, 1);
        c.write_control(0x0000, 0x0A);
        c.write_ram(0xA010, 0xAB);
        assert_eq!(c.read_ram(0xA010), 0xFB);
        // 512 cells mirrored through the window
        assert_eq!(c.read_ram(0xA210), 0xFB);
        assert_eq!(c.read_ram(0xBE10), 0xFB);
    }

    #[test]
    fn mbc2_register_chosen_by_address_bit_8() {
        let mut c = cart(0x05, 0x03, 0x00); // 16 banks
        c.write_control(0x2100, 0x00);
        assert_eq!(c.mapper.rom_bank(), 1);
        c.write_control(0x2100, 0x1D);
        assert_eq!(c.mapper.rom_bank(), 0x0D);
        c.write_control(0x2000, 0x03); // bit 8 clear: RAM enable latch
        assert_eq!(c.mapper.rom_bank(), 0x0D);
    }

    #[test]
    fn mbc3_seven_bit_rom_and_ram_select() {
        let mut c = cart(0x13, 0x06, 0x03); // 128 banks, 4 RAM banks
        c.write_control(0x2000, 0x00);
        assert_eq!(c.mapper.rom_bank(), 1);
        c.write_control(0x2000, 0x40);
        assert_eq!(c.read_rom(0x4000), 0x40);
        c.write_control(0x0000, 0x0A);
        c.write_control(0x4000, 0x02);
        c.write_ram(0xA000, 0x99);
        c.write_control(0x4000, 0x00);
        assert_eq!(c.read_ram(0xA000), 0x00);
        c.write_control(0x4000, 0x02);
        assert_eq!(c.read_ram(0xA000), 0x99);
    }

    #[test]
    fn mbc5_nine_bit_bank_without_advance() {
        let mut c = cart(0x19, 0x08, 0x00); // 512 banks
        c.write_control(0x2000, 0x00);
        assert_eq!(c.mapper.rom_bank(), 0);
        c.write_control(0x2000, 0x05);
        c.write_control(0x3000, 0x01);
        assert_eq!(c.mapper.rom_bank(), 0x105);
        assert_eq!(c.read_rom(0x4000), 0x05); // tag byte is the bank index truncated to u8
    }

    #[test]
    fn header_rejections() {
        let good = rom_with(0x00, 0x00, 0x00, &[]);
        assert!(matches!(Cartridge::from_bytes(good[..0x3FFF].to_vec()), Err(CoreError::ImageTooShort(_))));

        let mut bad_sum = good.clone();
        bad_sum[0x14D] ^= 0xFF;
        assert!(matches!(Cartridge::from_bytes(bad_sum), Err(CoreError::HeaderChecksum { .. })));

        let bad_type = rom_with(0x22, 0x00, 0x00, &[]);
        assert!(matches!(Cartridge::from_bytes(bad_type), Err(CoreError::UnsupportedMapper(0x22))));

        let mut bad_ram = rom_with(0x00, 0x00, 0x00, &[]);
        bad_ram[0x149] = 0x07;
        bad_ram[0x14D] = dmg_core::header_checksum(&bad_ram);
        assert!(matches!(Cartridge::from_bytes(bad_ram), Err(CoreError::UnsupportedRamSize(0x07))));

        let mut short = good.clone();
        short.truncate(0x6000);
        assert!(matches!(Cartridge::from_bytes(short), Err(CoreError::LengthMismatch { expected: 0x8000, .. })));

        let mut color = rom_with(0x00, 0x00, 0x00, &[]);
        color[0x143] = 0xC0;
        color[0x14D] = dmg_core::header_checksum(&color);
        assert!(matches!(Cartridge::from_bytes(color), Err(CoreError::ColorOnly)));
    }
}
