pub(crate) mod slot_store;

pub(crate) use slot_store::SlotStore;
