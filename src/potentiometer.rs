// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! POTX/POTY paddle inputs.
//!
//! Paddles are not emulated; an open input charges immediately and reads
//! as 0xff.

/// One paddle input.
#[derive(Clone, Copy, Debug, Default)]
pub struct Potentiometer;

impl Potentiometer {
    /// Value of the POTX/POTY register.
    pub const fn read_pot(&self) -> u8 {
        0xff
    }
}
