use std::collections::HashMap;

use super::address_table::AddressTable;
use super::ir::{Address, BUILTINS};
use crate::lang::Type;

/// Interned string literals, packed four bytes per word.
#[derive(Debug, Default)]
pub struct ConstantPool {
    words: Vec<u32>,
    interned: HashMap<String, Address>,
}

impl ConstantPool {
    /// Address of `s`, adding it on first sight.
    pub fn intern(&mut self, s: &str) -> Address {
        if let Some(&address) = self.interned.get(s) {
            return address;
        }
        let address = Address::Const(self.words.len() as u32);
        self.words.extend(pack(s.as_bytes()));
        self.interned.insert(s.to_string(), address);
        address
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }
}

/// Little-endian packing: first byte in the low bits, last word zero-padded.
/// The empty string still takes one word.
pub fn pack(bytes: &[u8]) -> Vec<u32> {
    if bytes.is_empty() {
        return vec![0];
    }
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(word)
        })
        .collect()
}

/// What a call site needs to know about its callee.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub index: usize,
    pub ret: Type,
    pub params: Vec<Type>,
}

/// State shared by every function of one generation run.
#[derive(Debug)]
pub struct GeneratorContext {
    next_label: u32,
    pub constants: ConstantPool,
    pub globals: AddressTable,
    functions: HashMap<String, Signature>,
}

impl Default for GeneratorContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GeneratorContext {
    pub fn new() -> Self {
        let mut functions = HashMap::new();
        functions.insert(
            BUILTINS[0].to_string(),
            Signature {
                index: 0,
                ret: Type::INT,
                params: vec![],
            },
        );
        functions.insert(
            BUILTINS[1].to_string(),
            Signature {
                index: 1,
                ret: Type::INT,
                params: vec![Type::INT],
            },
        );
        Self {
            next_label: 0,
            constants: ConstantPool::default(),
            globals: AddressTable::globals(),
            functions,
        }
    }

    /// A label number never handed out before in this run.
    pub fn fresh_label(&mut self) -> u32 {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    /// Register a definition. A later definition of the same name wins.
    pub fn declare_function(&mut self, name: &str, signature: Signature) {
        self.functions.insert(name.to_string(), signature);
    }

    pub fn function(&self, name: &str) -> Option<&Signature> {
        self.functions.get(name)
    }
}
