//! Pure trade arithmetic: fixed-point unit conversion and the
//! constant-product bonding-curve formulas. No I/O, no floats in anything
//! that feeds a transaction.

pub mod curve;
pub mod units;
