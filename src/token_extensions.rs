//! SPL mint parsing, including the token-2022 extension TLV list.
//!
//! Layout notes:
//! - The base mint record is 82 bytes (COption tags are 4-byte LE).
//! - Token-2022 pads mints to 165 bytes, writes a 1-byte account type
//!   (1 = mint), then TLV entries: type u16 LE, length u16 LE, value.
//! - `TransferFeeConfig` value: two 32-byte authorities, withheld u64,
//!   then older/newer `TransferFee { epoch u64, maximum_fee u64,
//!   basis_points u16 }`; the newer record is authoritative.

use solana_sdk::pubkey::Pubkey;

/// Base mint size
pub const MINT_BASE_LEN: usize = 82;

/// Offset where token-2022 account type + TLV data begins
pub const EXTENSION_START: usize = 165;

const ACCOUNT_TYPE_MINT: u8 = 1;

// Extension type ids from the token-2022 program
pub const EXT_TRANSFER_FEE_CONFIG: u16 = 1;
pub const EXT_MINT_CLOSE_AUTHORITY: u16 = 3;
pub const EXT_DEFAULT_ACCOUNT_STATE: u16 = 6;
pub const EXT_NON_TRANSFERABLE: u16 = 9;
pub const EXT_PERMANENT_DELEGATE: u16 = 12;
pub const EXT_TRANSFER_HOOK: u16 = 14;

const ACCOUNT_STATE_FROZEN: u8 = 2;

/// Extensions the risk analyzer cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintExtension {
    TransferFeeConfig { basis_points: u16, maximum_fee: u64 },
    MintCloseAuthority,
    DefaultAccountState { frozen: bool },
    NonTransferable,
    PermanentDelegate,
    TransferHook,
    Other(u16),
}

impl MintExtension {
    /// Extensions capable of denying or clawing back a sell
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            MintExtension::MintCloseAuthority
                | MintExtension::NonTransferable
                | MintExtension::PermanentDelegate
                | MintExtension::TransferHook
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            MintExtension::TransferFeeConfig { .. } => "TransferFeeConfig",
            MintExtension::MintCloseAuthority => "MintCloseAuthority",
            MintExtension::DefaultAccountState { .. } => "DefaultAccountState",
            MintExtension::NonTransferable => "NonTransferable",
            MintExtension::PermanentDelegate => "PermanentDelegate",
            MintExtension::TransferHook => "TransferHook",
            MintExtension::Other(_) => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintInfo {
    pub mint_authority: Option<Pubkey>,
    pub supply: u64,
    pub decimals: u8,
    pub freeze_authority: Option<Pubkey>,
    pub extensions: Vec<MintExtension>,
}

impl MintInfo {
    /// Parse a mint account owned by either token program.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < MINT_BASE_LEN {
            return None;
        }
        let mint_authority = read_coption_pubkey(data, 0)?;
        let supply = u64::from_le_bytes(data.get(36..44)?.try_into().ok()?);
        let decimals = *data.get(44)?;
        let initialized = *data.get(45)? != 0;
        if !initialized {
            return None;
        }
        let freeze_authority = read_coption_pubkey(data, 46)?;

        let extensions = parse_extension_tlv(data);

        Some(Self {
            mint_authority,
            supply,
            decimals,
            freeze_authority,
            extensions,
        })
    }

    pub fn critical_extensions(&self) -> Vec<&'static str> {
        self.extensions
            .iter()
            .filter(|e| e.is_critical())
            .map(|e| e.name())
            .collect()
    }

    /// Newer transfer-fee basis points, when the extension is present
    pub fn transfer_fee_bps(&self) -> Option<u16> {
        self.extensions.iter().find_map(|e| match e {
            MintExtension::TransferFeeConfig { basis_points, .. } => Some(*basis_points),
            _ => None,
        })
    }

    pub fn default_state_frozen(&self) -> bool {
        self.extensions.iter().any(|e| {
            matches!(
                e,
                MintExtension::DefaultAccountState { frozen: true }
            )
        })
    }

    pub fn has_extensions(&self) -> bool {
        !self.extensions.is_empty()
    }
}

/// The slice of an SPL token account the holder analysis consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccountInfo {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
}

/// Base token account size
pub const TOKEN_ACCOUNT_BASE_LEN: usize = 165;

impl TokenAccountInfo {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 72 {
            return None;
        }
        Some(Self {
            mint: Pubkey::new_from_array(data.get(0..32)?.try_into().ok()?),
            owner: Pubkey::new_from_array(data.get(32..64)?.try_into().ok()?),
            amount: u64::from_le_bytes(data.get(64..72)?.try_into().ok()?),
        })
    }
}

fn read_coption_pubkey(data: &[u8], offset: usize) -> Option<Option<Pubkey>> {
    let tag = u32::from_le_bytes(data.get(offset..offset + 4)?.try_into().ok()?);
    let key_bytes = data.get(offset + 4..offset + 36)?;
    match tag {
        0 => Some(None),
        1 => Some(Some(Pubkey::new_from_array(key_bytes.try_into().ok()?))),
        _ => None,
    }
}

/// Walk the TLV list after the padding block. Truncated or malformed
/// entries end the walk; extensions read so far are kept.
fn parse_extension_tlv(data: &[u8]) -> Vec<MintExtension> {
    let mut extensions = Vec::new();
    if data.len() <= EXTENSION_START {
        return extensions;
    }
    if data[EXTENSION_START] != ACCOUNT_TYPE_MINT {
        return extensions;
    }

    let mut cursor = EXTENSION_START + 1;
    while cursor + 4 <= data.len() {
        let ext_type = u16::from_le_bytes(data[cursor..cursor + 2].try_into().unwrap());
        let ext_len = u16::from_le_bytes(data[cursor + 2..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        if ext_type == 0 {
            break;
        }
        if cursor + ext_len > data.len() {
            break;
        }
        let value = &data[cursor..cursor + ext_len];
        cursor += ext_len;

        extensions.push(match ext_type {
            EXT_TRANSFER_FEE_CONFIG => parse_transfer_fee(value)
                .unwrap_or(MintExtension::Other(EXT_TRANSFER_FEE_CONFIG)),
            EXT_MINT_CLOSE_AUTHORITY => MintExtension::MintCloseAuthority,
            EXT_DEFAULT_ACCOUNT_STATE => MintExtension::DefaultAccountState {
                frozen: value.first().copied() == Some(ACCOUNT_STATE_FROZEN),
            },
            EXT_NON_TRANSFERABLE => MintExtension::NonTransferable,
            EXT_PERMANENT_DELEGATE => MintExtension::PermanentDelegate,
            EXT_TRANSFER_HOOK => MintExtension::TransferHook,
            other => MintExtension::Other(other),
        });
    }
    extensions
}

fn parse_transfer_fee(value: &[u8]) -> Option<MintExtension> {
    // authorities (64) + withheld (8) + older (18) + newer (18)
    let newer = value.get(90..108)?;
    let maximum_fee = u64::from_le_bytes(newer[8..16].try_into().ok()?);
    let basis_points = u16::from_le_bytes(newer[16..18].try_into().ok()?);
    Some(MintExtension::TransferFeeConfig {
        basis_points,
        maximum_fee,
    })
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::*;
    use super::*;

    #[test]
    fn test_base_mint_parses_authorities() {
        let authority = Pubkey::new_unique();
        let data = encode_mint(Some(authority), 1_000_000, 6, None);
        let info = MintInfo::parse(&data).unwrap();
        assert_eq!(info.mint_authority, Some(authority));
        assert_eq!(info.freeze_authority, None);
        assert_eq!(info.supply, 1_000_000);
        assert_eq!(info.decimals, 6);
        assert!(!info.has_extensions());
    }

    #[test]
    fn test_revoked_authorities() {
        let data = encode_mint(None, 0, 9, None);
        let info = MintInfo::parse(&data).unwrap();
        assert_eq!(info.mint_authority, None);
        assert_eq!(info.freeze_authority, None);
    }

    #[test]
    fn test_uninitialized_mint_rejected() {
        let mut data = encode_mint(None, 0, 6, None);
        data[45] = 0;
        assert!(MintInfo::parse(&data).is_none());
    }

    #[test]
    fn test_critical_extension_detected() {
        let data = with_extensions(
            encode_mint(None, 0, 6, None),
            &[(EXT_MINT_CLOSE_AUTHORITY, vec![0u8; 32])],
        );
        let info = MintInfo::parse(&data).unwrap();
        assert_eq!(info.critical_extensions(), vec!["MintCloseAuthority"]);
    }

    #[test]
    fn test_transfer_fee_reads_newer_record() {
        let data = with_extensions(
            encode_mint(None, 0, 6, None),
            &[(EXT_TRANSFER_FEE_CONFIG, transfer_fee_value(250, 1_000_000))],
        );
        let info = MintInfo::parse(&data).unwrap();
        assert_eq!(info.transfer_fee_bps(), Some(250));
        assert!(info.critical_extensions().is_empty());
    }

    #[test]
    fn test_default_account_state_frozen() {
        let data = with_extensions(
            encode_mint(None, 0, 6, None),
            &[(EXT_DEFAULT_ACCOUNT_STATE, vec![2u8])],
        );
        let info = MintInfo::parse(&data).unwrap();
        assert!(info.default_state_frozen());
    }

    #[test]
    fn test_multiple_extensions_walked() {
        let data = with_extensions(
            encode_mint(None, 0, 6, None),
            &[
                (EXT_TRANSFER_FEE_CONFIG, transfer_fee_value(50, 0)),
                (EXT_PERMANENT_DELEGATE, vec![0u8; 32]),
                (EXT_TRANSFER_HOOK, vec![0u8; 64]),
            ],
        );
        let info = MintInfo::parse(&data).unwrap();
        assert_eq!(info.extensions.len(), 3);
        let critical = info.critical_extensions();
        assert!(critical.contains(&"PermanentDelegate"));
        assert!(critical.contains(&"TransferHook"));
    }

    #[test]
    fn test_token_account_parse() {
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let mut data = vec![0u8; TOKEN_ACCOUNT_BASE_LEN];
        data[0..32].copy_from_slice(mint.as_ref());
        data[32..64].copy_from_slice(owner.as_ref());
        data[64..72].copy_from_slice(&123_456u64.to_le_bytes());
        let info = TokenAccountInfo::parse(&data).unwrap();
        assert_eq!(info.mint, mint);
        assert_eq!(info.owner, owner);
        assert_eq!(info.amount, 123_456);
    }

    #[test]
    fn test_truncated_tlv_keeps_earlier_entries() {
        let mut data = with_extensions(
            encode_mint(None, 0, 6, None),
            &[(EXT_PERMANENT_DELEGATE, vec![0u8; 32])],
        );
        // Dangling header claiming more bytes than remain.
        data.extend_from_slice(&EXT_TRANSFER_HOOK.to_le_bytes());
        data.extend_from_slice(&64u16.to_le_bytes());
        data.extend_from_slice(&[0u8; 4]);
        let info = MintInfo::parse(&data).unwrap();
        assert_eq!(info.extensions.len(), 1);
    }
}
