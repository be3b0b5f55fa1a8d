use alloy::primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub address: Address,
    pub bytecode: Bytes,
    pub block_number: u64,
    pub transaction_hash: Option<B256>,
    pub creator: Option<Address>,
    pub is_erc20: bool,
    pub is_erc721: bool,
}

const ERC20_SELECTORS: [[u8; 4]; 4] = [
    [0x18, 0x16, 0x0d, 0xdd], // totalSupply()
    [0x70, 0xa0, 0x82, 0x31], // balanceOf(address)
    [0xa9, 0x05, 0x9c, 0xbb], // transfer(address,uint256)
    [0xdd, 0x62, 0xed, 0x3e], // allowance(address,address)
];

const ERC721_SELECTORS: [[u8; 4]; 3] = [
    [0x63, 0x52, 0x21, 0x1e], // ownerOf(uint256)
    [0x42, 0x84, 0x2e, 0x0e], // safeTransferFrom(address,address,uint256)
    [0x70, 0xa0, 0x82, 0x31], // balanceOf(address)
];

/// Bytecode heuristic: a dispatcher pushes every selector it handles with `PUSH4`.
fn implements(bytecode: &[u8], selectors: &[[u8; 4]]) -> bool {
    selectors.iter().all(|selector| {
        bytecode
            .windows(5)
            .any(|window| window[0] == 0x63 && window[1..] == selector[..])
    })
}

impl Contract {
    pub fn classify(mut self) -> Self {
        self.is_erc20 = implements(&self.bytecode, &ERC20_SELECTORS);
        self.is_erc721 = implements(&self.bytecode, &ERC721_SELECTORS);
        self
    }
}
