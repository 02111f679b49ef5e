use crate::common::{PageId, Result, StoreError, INVALID_PAGE_ID, PAGE_SIZE};

/// Maximum length of an index name stored in the header page
pub const MAX_NAME_LEN: usize = 32;

const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;
const RECORD_SIZE: usize = MAX_NAME_LEN + 4;

/// Maximum number of (name, root page id) records the header page can hold
pub const MAX_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

fn encode_name(name: &str) -> [u8; MAX_NAME_LEN] {
    let bytes = name.as_bytes();
    assert!(
        bytes.len() <= MAX_NAME_LEN,
        "index name longer than {MAX_NAME_LEN} bytes"
    );
    let mut out = [0u8; MAX_NAME_LEN];
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

/// Read view over the header page (page 0), which records the root page id
/// of every named index. Rewritten whenever a tree's root changes.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        u32::from_le_bytes(
            self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
                .try_into()
                .unwrap(),
        ) as usize
    }

    fn record_offset(index: usize) -> usize {
        RECORDS_OFFSET + index * RECORD_SIZE
    }

    fn find(&self, name: &[u8; MAX_NAME_LEN]) -> Option<usize> {
        (0..self.record_count()).find(|&i| {
            let offset = Self::record_offset(i);
            &self.data[offset..offset + MAX_NAME_LEN] == name
        })
    }

    /// Root page id recorded for `name`, if any.
    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        let idx = self.find(&encode_name(name))?;
        let offset = Self::record_offset(idx) + MAX_NAME_LEN;
        let root = PageId::new(u32::from_le_bytes(
            self.data[offset..offset + 4].try_into().unwrap(),
        ));
        (root != INVALID_PAGE_ID).then_some(root)
    }
}

/// Write view over the header page.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self) {
        self.data.fill(0);
    }

    fn as_ref(&self) -> HeaderPageRef<'_> {
        HeaderPageRef { data: &*self.data }
    }

    pub fn record_count(&self) -> usize {
        self.as_ref().record_count()
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        self.as_ref().get_root_id(name)
    }

    fn set_record_count(&mut self, count: usize) {
        self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .copy_from_slice(&(count as u32).to_le_bytes());
    }

    fn write_record(&mut self, index: usize, name: &[u8; MAX_NAME_LEN], root: PageId) {
        let offset = HeaderPageRef::record_offset(index);
        self.data[offset..offset + MAX_NAME_LEN].copy_from_slice(name);
        self.data[offset + MAX_NAME_LEN..offset + RECORD_SIZE]
            .copy_from_slice(&root.as_u32().to_le_bytes());
    }

    /// Adds a new record. Returns false when `name` is already present.
    pub fn insert_record(&mut self, name: &str, root: PageId) -> Result<bool> {
        let encoded = encode_name(name);
        if self.as_ref().find(&encoded).is_some() {
            return Ok(false);
        }
        let count = self.record_count();
        if count == MAX_RECORDS {
            return Err(StoreError::HeaderFull);
        }
        self.write_record(count, &encoded, root);
        self.set_record_count(count + 1);
        Ok(true)
    }

    /// Rewrites the root page id of an existing record. Returns false when
    /// `name` is absent.
    pub fn update_record(&mut self, name: &str, root: PageId) -> bool {
        let encoded = encode_name(name);
        match self.as_ref().find(&encoded) {
            Some(idx) => {
                self.write_record(idx, &encoded, root);
                true
            }
            None => false,
        }
    }

    /// Drops the record for `name`, compacting the tail over it.
    pub fn delete_record(&mut self, name: &str) -> bool {
        let encoded = encode_name(name);
        let Some(idx) = self.as_ref().find(&encoded) else {
            return false;
        };
        let count = self.record_count();
        let start = HeaderPageRef::record_offset(idx + 1);
        let end = HeaderPageRef::record_offset(count);
        self.data
            .copy_within(start..end, HeaderPageRef::record_offset(idx));
        self.set_record_count(count - 1);
        true
    }
}
