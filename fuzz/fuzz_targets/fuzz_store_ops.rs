//! Fuzz target: store writes interleaved with power loss
//!
//! Interprets the input as a sequence of field writes, commits and
//! simulated resets, and checks that after every reset the store reads
//! back exactly what was last committed.
//!
//! cargo fuzz run fuzz_store_ops

#![no_main]

use libfuzzer_sys::fuzz_target;
use flowmeter::adapters::nvs::NvsAdapter;
use flowmeter::app::ports::NvmPort;
use flowmeter::storage::{PersistedField, PersistentStore, RECORD_SIZE};

fuzz_target!(|data: &[u8]| {
    let mut store = PersistentStore::new(NvsAdapter::new().unwrap());
    store.begin().unwrap();
    let mut committed = store.backend().durable_image();

    for op in data.chunks(5) {
        let field = PersistedField::DATA[op[0] as usize % PersistedField::DATA.len()];
        match op[0] >> 6 {
            // Staged write only.
            0 if op.len() == 5 => {
                store
                    .backend_mut()
                    .write(field.offset(), &op[1..5])
                    .unwrap();
            }
            // Durable write.
            1 if op.len() == 5 => {
                let mut w = [0u8; 4];
                w.copy_from_slice(&op[1..5]);
                store.save(field, field.decode(w)).unwrap();
                committed = store.backend().durable_image();
            }
            // Power loss.
            2 => {
                let nvm = store.into_backend().simulate_power_loss();
                store = PersistentStore::new(nvm);
                store.begin().unwrap();
                let mut now = [0u8; RECORD_SIZE];
                store.backend().read(0, &mut now).unwrap();
                assert_eq!(now, committed);
            }
            _ => {}
        }
    }
});
