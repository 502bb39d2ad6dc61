// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Audio conversion between the telephony and realtime legs.

pub mod codec;
