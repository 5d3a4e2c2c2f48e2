// conversion factor from femtoseconds to atomic units of time
pub const FS_TO_AU: f64 = 41.341374575751;
