//! Resource management: the manifest catalog, bank-file access and the
//! ownership of currently-resident resource buffers.
//!
//! Game data ships as a manifest (`MEMLIST.BIN`) describing up to 256
//! resources, plus thirteen bank files holding the raw, usually
//! compressed, bytes. The physical file system is only reachable through
//! [`ResourceRepository`]; [`DiskRepository`] is the stock implementation
//! over a game-data directory.

pub mod unpack;

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;

use byteorder::{ReadBytesExt, BE};
use tracing::{debug, info};

use crate::errors::{Error, Result};
use crate::parts::GamePart;

/// File name of the resource manifest inside the game-data directory.
pub const MANIFEST_NAME: &str = "MEMLIST.BIN";

/// Number of slots addressable by a resource id.
pub const MAX_RESOURCES: usize = 256;

/// Bank ids found in manifests are `1..=NUM_BANKS`.
pub const NUM_BANKS: u8 = 13;

/// The kind of content stored in a resource slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResourceKind {
    /// Audio sample, or an empty slot when the sizes are zero.
    /// Loaded on demand by the load-resource instruction.
    Sound = 0,
    /// Music module (patterns + instrument list).
    Music = 1,
    /// Full-screen background bitmap. Blitted into buffer 0 on load, never
    /// retained.
    Bitmap = 2,
    /// 32 palettes of 16 colors. Referenced from the game-part table.
    Palettes = 3,
    /// Bytecode for the virtual machine. Referenced from the game-part
    /// table.
    Bytecode = 4,
    /// Polygons for cinematics and backgrounds.
    Polygons = 5,
    /// Alternate polygon segment used for gameplay sprites.
    SpritePolygons = 6,
}

impl ResourceKind {
    fn from_raw(raw: u8) -> Result<ResourceKind> {
        Ok(match raw {
            0 => ResourceKind::Sound,
            1 => ResourceKind::Music,
            2 => ResourceKind::Bitmap,
            3 => ResourceKind::Palettes,
            4 => ResourceKind::Bytecode,
            5 => ResourceKind::Polygons,
            6 => ResourceKind::SpritePolygons,
            _ => return Err(Error::InvalidManifest),
        })
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            ResourceKind::Sound => "Sound",
            ResourceKind::Music => "Music",
            ResourceKind::Bitmap => "Bitmap",
            ResourceKind::Palettes => "Palettes",
            ResourceKind::Bytecode => "Bytecode",
            ResourceKind::Polygons => "Polygons",
            ResourceKind::SpritePolygons => "SpritePolygons",
        };
        write!(f, "{}", s)
    }
}

/// Where a resource lives and how big it is, as read from the manifest.
#[derive(Clone, Copy, Debug)]
pub struct ResourceDescriptor {
    pub kind: ResourceKind,
    pub bank_id: u8,
    pub bank_offset: u32,
    pub packed_size: usize,
    pub size: usize,
}

impl ResourceDescriptor {
    /// Equal packed and unpacked sizes mean the bytes are stored raw.
    pub fn is_packed(&self) -> bool {
        self.packed_size < self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Each manifest record is 20 bytes: kind, bank id, bank offset (u32 BE),
/// packed size (u16 BE), unpacked size (u16 BE), then packing bytes from
/// the original in-memory layout. A record with kind 0xFF terminates the
/// manifest.
const MANIFEST_RECORD_PACKING: usize = 10;
const MANIFEST_TERMINATOR: u8 = 0xff;

/// Parse a full manifest into one descriptor per id, empty slots included.
pub fn parse_manifest<R: Read>(mut reader: R) -> Result<Vec<ResourceDescriptor>> {
    let mut descriptors = Vec::new();

    loop {
        let kind = reader.read_u8().map_err(map_eof)?;
        if kind == MANIFEST_TERMINATOR {
            break;
        }

        let bank_id = reader.read_u8().map_err(map_eof)?;
        let bank_offset = reader.read_u32::<BE>().map_err(map_eof)?;
        let packed_size = reader.read_u16::<BE>().map_err(map_eof)? as usize;
        let size = reader.read_u16::<BE>().map_err(map_eof)? as usize;
        let mut packing = [0u8; MANIFEST_RECORD_PACKING];
        reader.read_exact(&mut packing).map_err(map_eof)?;

        if packed_size > size {
            return Err(Error::InvalidManifest);
        }
        if size > 0 && !(1..=NUM_BANKS).contains(&bank_id) {
            return Err(Error::InvalidManifest);
        }
        if descriptors.len() == MAX_RESOURCES {
            return Err(Error::InvalidManifest);
        }

        let desc = ResourceDescriptor {
            kind: ResourceKind::from_raw(kind)?,
            bank_id,
            bank_offset,
            packed_size,
            size,
        };
        debug!(
            "resource 0x{:02x}: {} {} ({}) bytes @{:x},{:08x}",
            descriptors.len(),
            desc.kind,
            desc.size,
            desc.packed_size,
            desc.bank_id,
            desc.bank_offset
        );
        descriptors.push(desc);
    }

    Ok(descriptors)
}

fn map_eof(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::TruncatedData,
        _ => Error::Repository(e),
    }
}

/// Narrow interface to wherever the game data physically lives.
pub trait ResourceRepository {
    /// The full catalog, dense and ordered by id.
    fn descriptors(&self) -> Result<Vec<ResourceDescriptor>>;

    /// Read the raw (still packed) bytes of `desc` into
    /// `dest[..desc.packed_size]`.
    fn read_raw(&self, desc: &ResourceDescriptor, dest: &mut [u8]) -> Result<()>;

    /// Read and, if needed, decompress `desc` into `dest`, filling exactly
    /// `desc.size` bytes.
    fn read_resource(&self, desc: &ResourceDescriptor, dest: &mut [u8]) -> Result<usize> {
        if dest.len() < desc.size {
            return Err(Error::BufferTooSmall {
                needed: desc.size,
                actual: dest.len(),
            });
        }

        self.read_raw(desc, &mut dest[..desc.packed_size])?;
        if desc.is_packed() {
            unpack::unpack_in_place(&mut dest[..desc.size], desc.packed_size)?;
        }
        Ok(desc.size)
    }
}

/// Repository over an on-disk game-data directory holding `MEMLIST.BIN`
/// and `BANK01`..`BANK0D`.
pub struct DiskRepository {
    dir: PathBuf,
}

impl DiskRepository {
    pub fn new<P: Into<PathBuf>>(dir: P) -> DiskRepository {
        DiskRepository { dir: dir.into() }
    }

    fn bank_path(&self, bank_id: u8) -> PathBuf {
        self.dir.join(format!("BANK{:02X}", bank_id))
    }
}

impl ResourceRepository for DiskRepository {
    fn descriptors(&self) -> Result<Vec<ResourceDescriptor>> {
        let file = File::open(self.dir.join(MANIFEST_NAME))?;
        parse_manifest(io::BufReader::new(file))
    }

    fn read_raw(&self, desc: &ResourceDescriptor, dest: &mut [u8]) -> Result<()> {
        let mut file = File::open(self.bank_path(desc.bank_id))?;
        file.seek(SeekFrom::Start(desc.bank_offset as u64))?;
        file.read_exact(dest).map_err(map_eof)?;
        Ok(())
    }
}

/// What came out of an individual (instruction-driven) resource load.
pub enum LoadedResource {
    /// Raw bitmap bytes. Not retained; the caller blits them into video
    /// buffer 0 right away.
    Bitmap(Vec<u8>),
    /// The resource is now resident and addressable by id.
    Resident(ResourceKind),
    /// The slot exists but holds no data.
    Empty,
}

/// The four resources making up a loaded game part.
pub struct PartAssets {
    pub bytecode: Vec<u8>,
    pub palettes: Vec<u8>,
    pub polygons: Vec<u8>,
    pub animations: Option<Vec<u8>>,
}

/// Owner of every currently-resident resource buffer.
///
/// Individually-loaded resources (audio, mostly) live in a per-id map and
/// are evicted by [`ResourceManager::unload_all`] or by the next game-part
/// load. The four per-part resources are handed to the machine as owned
/// buffers by [`ResourceManager::load_part`], which first evicts
/// everything from the previous part.
pub struct ResourceManager {
    repository: Box<dyn ResourceRepository>,
    catalog: Vec<ResourceDescriptor>,
    resident: BTreeMap<u8, Vec<u8>>,
}

impl ResourceManager {
    pub fn new(repository: Box<dyn ResourceRepository>) -> Result<ResourceManager> {
        let catalog = repository.descriptors()?;
        info!("catalog holds {} resource slots", catalog.len());
        Ok(ResourceManager {
            repository,
            catalog,
            resident: BTreeMap::new(),
        })
    }

    pub fn descriptor(&self, id: u16) -> Result<&ResourceDescriptor> {
        self.catalog
            .get(id as usize)
            .ok_or(Error::InvalidResourceId(id))
    }

    fn read_to_vec(&self, id: u16) -> Result<Vec<u8>> {
        let desc = self.descriptor(id)?;
        let mut data = vec![0u8; desc.size];
        self.repository.read_resource(desc, &mut data)?;
        Ok(data)
    }

    /// Load one resource on behalf of the load-resource instruction.
    #[tracing::instrument(skip(self))]
    pub fn load_individual(&mut self, id: u16) -> Result<LoadedResource> {
        let desc = *self.descriptor(id)?;
        if desc.is_empty() {
            return Ok(LoadedResource::Empty);
        }

        if desc.kind == ResourceKind::Bitmap {
            return Ok(LoadedResource::Bitmap(self.read_to_vec(id)?));
        }

        // At most one live buffer per id.
        if !self.resident.contains_key(&(id as u8)) {
            info!("loading resource 0x{:02x} of kind {}", id, desc.kind);
            let data = self.read_to_vec(id)?;
            self.resident.insert(id as u8, data);
        }
        Ok(LoadedResource::Resident(desc.kind))
    }

    /// Evict everything, then load the four resources of `part`.
    #[tracing::instrument(skip(self))]
    pub fn load_part(&mut self, part: GamePart) -> Result<PartAssets> {
        self.resident.clear();

        let ids = part.resources();
        info!(?part, "loading game part");
        Ok(PartAssets {
            bytecode: self.read_to_vec(ids.bytecode as u16)?,
            palettes: self.read_to_vec(ids.palettes as u16)?,
            polygons: self.read_to_vec(ids.polygons as u16)?,
            animations: match ids.animations {
                Some(id) => Some(self.read_to_vec(id as u16)?),
                None => None,
            },
        })
    }

    /// Evict individually-loaded resources; part slots are untouched.
    pub fn unload_all(&mut self) {
        if !self.resident.is_empty() {
            debug!("evicting {} resident resources", self.resident.len());
        }
        self.resident.clear();
    }

    /// Current bytes of a resident resource, if any.
    pub fn resident(&self, id: u8) -> Option<&[u8]> {
        self.resident.get(&id).map(|v| v.as_slice())
    }
}
