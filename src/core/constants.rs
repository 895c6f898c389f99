// ============================================================================
// spark-bindings - Constants
// Flag constants for accessor capabilities and binding directions
// ============================================================================

// =============================================================================
// ACCESSOR CAPABILITY FLAGS
// =============================================================================

/// Accessor can be read with `get_value`
pub const READABLE: u32 = 1 << 0;

/// Accessor can be written with `set_value`
pub const WRITABLE: u32 = 1 << 1;

/// Accessor notifies subscribers when its value changes
pub const OBSERVABLE: u32 = 1 << 2;

/// Accessor value is derived from other observables (computed getter)
pub const COMPUTED: u32 = 1 << 3;

/// Accessor views an ordered or keyed collection
pub const COLLECTION: u32 = 1 << 4;

/// A plain read/write observed slot
pub const PROPERTY: u32 = READABLE | WRITABLE | OBSERVABLE;

// =============================================================================
// BINDING DIRECTION FLAGS
// =============================================================================

/// Evaluate once, never subscribe
pub const ONE_TIME: u32 = 1 << 8;

/// Source changes flow into the target
pub const TO_TARGET: u32 = 1 << 9;

/// Target changes flow back into the source
pub const FROM_TARGET: u32 = 1 << 10;

/// Both directions
pub const TWO_WAY: u32 = TO_TARGET | FROM_TARGET;

// =============================================================================
// TESTS
// =============================================================================
