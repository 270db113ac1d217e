//! Distribution capability flags.
//!
//! The 64-bit bitfield exchanged in the `send_name` and challenge messages
//! of the version-6 handshake. Most bits are mandatory in modern OTP;
//! `NAME_ME` additionally asks the accepting node to assign us our node
//! name and creation, which is how this client obtains its identity.

use bitflags::bitflags;

bitflags! {
    /// Capability bits of the version-6 distribution handshake.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DistFlags: u64 {
        /// Extended (3 × 32-bit) references. Mandatory.
        const EXTENDED_REFERENCES = 0x4;
        /// Distribution tags for funs. Mandatory.
        const FUN_TAGS = 0x10;
        /// The NEW_FUN_EXT tag. Mandatory.
        const NEW_FUN_TAGS = 0x80;
        /// Extended pids and ports. Mandatory.
        const EXTENDED_PIDS_PORTS = 0x100;
        /// The EXPORT_EXT tag. Mandatory.
        const EXPORT_PTR_TAG = 0x200;
        /// The BIT_BINARY_EXT tag. Mandatory.
        const BIT_BINARIES = 0x400;
        /// IEEE-754 floats via NEW_FLOAT_EXT. Mandatory.
        const NEW_FLOATS = 0x800;
        /// UTF-8 atoms. Mandatory.
        const UTF8_ATOMS = 0x10000;
        /// The MAP_EXT tag. Mandatory.
        const MAP_TAG = 0x20000;
        /// 32-bit creations (NEW_PID_EXT, NEWER_REFERENCE_EXT). Mandatory.
        const BIG_CREATION = 0x40000;
        /// SEND_SENDER control messages instead of SEND.
        const SEND_SENDER = 0x80000;
        /// The OTP 23 handshake itself. Mandatory from OTP 25.
        const HANDSHAKE_23 = 0x1000000;
        /// The id-carrying unlink protocol.
        const UNLINK_ID = 0x2000000;
        /// Spawn-request control messages.
        const SPAWN = 1 << 32;
        /// Ask the accepting node to assign our name (dynamic node name).
        const NAME_ME = 1 << 33;
        /// Node container types version 4: full 32-bit pid id/serial and
        /// up to five reference words. Mandatory from OTP 26.
        const V4_NC = 1 << 34;
        /// Process aliases.
        const ALIAS = 1 << 35;
        /// All OTP 25 mandatory capabilities. Mandatory from OTP 26.
        const MANDATORY_25_DIGEST = 1 << 36;
    }
}

/// The flag set this client sends in `send_name`.
pub fn handshake_flags() -> DistFlags {
    DistFlags::EXTENDED_REFERENCES
        | DistFlags::FUN_TAGS
        | DistFlags::NEW_FUN_TAGS
        | DistFlags::EXTENDED_PIDS_PORTS
        | DistFlags::EXPORT_PTR_TAG
        | DistFlags::BIT_BINARIES
        | DistFlags::NEW_FLOATS
        | DistFlags::UTF8_ATOMS
        | DistFlags::MAP_TAG
        | DistFlags::BIG_CREATION
        | DistFlags::SEND_SENDER
        | DistFlags::HANDSHAKE_23
        | DistFlags::UNLINK_ID
        | DistFlags::NAME_ME
        | DistFlags::V4_NC
        | DistFlags::MANDATORY_25_DIGEST
}
