mod common;

mod profiles {
    use crate::common::{self, MockEeprom};
    use audio_eeprom::crc::crc32;
    use audio_eeprom::error::{Error, Record};
    use audio_eeprom::{OpenMode, ProfileDescriptor, ProfileSize, Store};
    use pretty_assertions::assert_eq;

    fn formatted() -> MockEeprom {
        let mut eeprom = MockEeprom::new();
        Store::open(&mut eeprom, OpenMode::ForceDefault).unwrap();
        eeprom.operations.clear();
        eeprom
    }

    #[test]
    fn install_and_remove_keep_index_consistent() {
        let mut eeprom = formatted();
        let payload = common::profile_payload("Loudness", 100);
        {
            let mut store = Store::open(&mut eeprom, OpenMode::Strict).unwrap();
            store.install_profile(2, 0x0200, &payload).unwrap();

            assert_eq!(store.header().profile_mask(), 0b0000_0100);
            assert_eq!(
                store.header().profile(2),
                Some(&ProfileDescriptor {
                    address: 0x0200,
                    len: 100,
                    crc: crc32(&payload),
                })
            );
            assert!(store.header().profile_index_is_consistent());
        }
        assert_eq!(&eeprom.buf[0x0200..0x0264], payload.as_slice());

        let mut store = Store::open(&mut eeprom, OpenMode::Strict).unwrap();
        assert_eq!(store.header().profile_mask(), 0b0000_0100);
        store.verify_profile(2).unwrap();

        store.remove_profile(2).unwrap();
        assert_eq!(store.header().profile_mask(), 0);
        assert_eq!(
            store.header().profile(2),
            Some(&ProfileDescriptor {
                address: 0x0200,
                len: 0,
                crc: 0,
            })
        );
        assert_eq!(store.verify_profile(2), Err(Error::EmptySlot(2)));

        let store = Store::open(&mut eeprom, OpenMode::Strict).unwrap();
        assert_eq!(store.header().profile_mask(), 0);
        assert!(store.header().profile_index_is_consistent());
        // the payload itself is left alone
        assert_eq!(&eeprom.buf[0x0200..0x0264], payload.as_slice());
    }

    #[test]
    fn install_writes_payload_before_header() {
        let mut eeprom = formatted();
        {
            let mut store = Store::open(&mut eeprom, OpenMode::Strict).unwrap();
            store
                .install_profile(2, 0x0200, &common::profile_payload("Night", 100))
                .unwrap();
        }

        let mut expected = vec![common::Operation::Read {
            offset: 0,
            len: 128,
        }];
        expected.extend(common::page_writes(0x0200, 100));
        expected.extend(common::page_writes(0x0000, 128));
        assert_eq!(eeprom.operations, expected);
    }

    #[test]
    fn removing_an_unused_slot_is_a_noop() {
        let mut eeprom = formatted();
        {
            let mut store = Store::open(&mut eeprom, OpenMode::Strict).unwrap();
            store.remove_profile(5).unwrap();
        }
        assert_eq!(eeprom.writes(), 0);
    }

    #[test]
    fn corrupt_payload_is_detected() {
        let mut eeprom = formatted();
        let payload = common::profile_payload("Flat", ProfileSize::Small.bytes() as usize);
        let slot = Store::open(&mut eeprom, OpenMode::Strict)
            .unwrap()
            .add_profile(&payload)
            .unwrap();
        assert_eq!(slot, 0);

        eeprom.flip_bit(0x0180 + 700, 4);

        let mut store = Store::open(&mut eeprom, OpenMode::Strict).unwrap();
        assert_eq!(
            store.verify_profile(0),
            Err(Error::IntegrityMismatch(Record::Profile(0)))
        );
        assert_eq!(
            store.read_profile(0),
            Err(Error::IntegrityMismatch(Record::Profile(0)))
        );
        // the name isn't covered by the check
        assert_eq!(store.profile_name(0), Ok("Flat".into()));
    }

    #[test]
    fn read_returns_payload() {
        let mut eeprom = formatted();
        let payload = common::profile_payload("Movie", ProfileSize::Medium.bytes() as usize);
        let mut store = Store::open(&mut eeprom, OpenMode::Strict).unwrap();

        let slot = store.add_profile(&payload).unwrap();

        assert_eq!(store.read_profile(slot), Ok(payload));
        assert_eq!(
            ProfileSize::from_len(store.header().profile(slot).unwrap().len),
            Some(ProfileSize::Medium)
        );
    }

    #[test]
    fn profile_names() {
        let mut eeprom = formatted();
        let mut store = Store::open(&mut eeprom, OpenMode::Strict).unwrap();

        store
            .install_profile(0, 0x0180, &common::profile_payload("Bass boost", 64))
            .unwrap();
        store
            .install_profile(1, 0x01C0, &common::profile_payload("", 64))
            .unwrap();

        assert_eq!(store.profile_name(0), Ok("Bass boost".into()));
        assert_eq!(store.profile_name(1), Ok("".into()));
        assert_eq!(store.profile_name(2), Err(Error::EmptySlot(2)));
    }

    #[test]
    fn invalid_placement_is_rejected() {
        let mut eeprom = formatted();
        let payload = common::profile_payload("Voice", 100);
        {
            let mut store = Store::open(&mut eeprom, OpenMode::Strict).unwrap();
            store.install_profile(0, 0x0200, &payload).unwrap();
        }
        let writes = eeprom.writes();

        let mut store = Store::open(&mut eeprom, OpenMode::Strict).unwrap();
        // overlapping the profile in slot 0
        assert_eq!(
            store.install_profile(1, 0x0240, &payload),
            Err(Error::OutOfRange)
        );
        assert_eq!(
            store.install_profile(1, 0x01C0, &payload),
            Err(Error::OutOfRange)
        );
        // inside the configuration
        assert_eq!(
            store.install_profile(1, 0x0100, &payload),
            Err(Error::OutOfRange)
        );
        // past the end of the device
        assert_eq!(
            store.install_profile(1, 0x7FC0, &payload),
            Err(Error::OutOfRange)
        );
        assert_eq!(store.install_profile(1, 0x0400, &[]), Err(Error::OutOfRange));
        assert_eq!(
            store.install_profile(8, 0x0400, &payload),
            Err(Error::OutOfRange)
        );
        assert_eq!(store.verify_profile(8), Err(Error::OutOfRange));
        assert_eq!(store.remove_profile(8), Err(Error::OutOfRange));

        // replacing the profile of the same slot in place is fine
        store.install_profile(0, 0x0200, &payload).unwrap();
        assert_eq!(store.header().profile_mask(), 0b0000_0001);
        drop(store);

        assert_eq!(eeprom.writes(), writes + 2 + 2);
    }

    #[test]
    fn add_places_profiles_on_page_boundaries() {
        let mut eeprom = formatted();
        let mut store = Store::open(&mut eeprom, OpenMode::Strict).unwrap();

        let small = common::profile_payload("Small", ProfileSize::Small.bytes() as usize);
        let medium = common::profile_payload("Medium", ProfileSize::Medium.bytes() as usize);
        assert_eq!(store.add_profile(&small), Ok(0));
        assert_eq!(store.add_profile(&medium), Ok(1));

        assert_eq!(store.header().profile(0).unwrap().address, 0x0180);
        // 0x0180 + 1438 rounded up to the next page
        assert_eq!(store.header().profile(1).unwrap().address, 0x0740);

        let used: Vec<u8> = store.profiles().map(|(slot, _)| slot).collect();
        assert_eq!(used, vec![0, 1]);

        let statistics = store.statistics();
        assert_eq!(statistics.used_slots, 2);
        assert_eq!(statistics.free_slots, 6);
        assert_eq!(statistics.used_bytes, 1438 + 2846);
        assert_eq!(statistics.free_bytes, 32 * 1024 - (0x0740 + 2846));

        // a freed slot is reused, but not the space in front of the last profile
        store.remove_profile(0).unwrap();
        assert_eq!(store.add_profile(&small), Ok(0));
        assert_eq!(
            store.header().profile(0).unwrap().address,
            (0x0740 + 2846 + 63) / 64 * 64
        );
    }

    #[test]
    fn table_is_limited_to_eight_slots() {
        let mut eeprom = formatted();
        let mut store = Store::open(&mut eeprom, OpenMode::Strict).unwrap();
        let payload = common::profile_payload("Preset", ProfileSize::Small.bytes() as usize);

        for slot in 0..8 {
            assert_eq!(store.add_profile(&payload), Ok(slot));
        }
        assert_eq!(store.add_profile(&payload), Err(Error::OutOfRange));
        assert_eq!(store.statistics().free_slots, 0);
    }

    #[test]
    fn add_fails_when_device_is_full() {
        let mut eeprom = formatted();
        let mut store = Store::open(&mut eeprom, OpenMode::Strict).unwrap();
        let large = common::profile_payload("Large", ProfileSize::Large.bytes() as usize);

        // 0x0180 + 5 * 5696 = 28864, another 5662 bytes don't fit into 32 KiB
        for slot in 0..5 {
            assert_eq!(store.add_profile(&large), Ok(slot));
        }
        assert_eq!(store.add_profile(&large), Err(Error::OutOfRange));

        let small = common::profile_payload("Small", ProfileSize::Small.bytes() as usize);
        assert_eq!(store.add_profile(&small), Ok(5));
    }

    #[test]
    fn failed_payload_write_leaves_index_untouched() {
        // read + 2 header pages while formatting, read while opening, then one payload page
        let mut eeprom = MockEeprom::new_with_fault(5);
        Store::open(&mut eeprom, OpenMode::ForceDefault).unwrap();
        let before = eeprom.buf[..128].to_vec();

        let mut store = Store::open(&mut eeprom, OpenMode::Strict).unwrap();
        let result = store.install_profile(3, 0x0400, &common::profile_payload("Party", 200));
        assert!(matches!(result, Err(Error::WriteFailure { address: 0x0440, offset: 64, .. })));
        assert_eq!(store.header().profile_mask(), 0);
        drop(store);

        assert_eq!(eeprom.buf[..128].to_vec(), before);
    }
}
