//! Binary Scene Cache
//!
//! Compact cache of the parsed scene, written next to the source assets so
//! later runs skip reparsing. All integers are little-endian `u32`; the
//! layout is a forward sequence of length-prefixed records:
//!
//! - Section 1, meshes: count, then per mesh
//!   `name_len, name, vertex_bytes, index_bytes, vertices, indices,
//!   material_index, world (f32x16), texture_transform (f32x16)`.
//! - Section 2, diffuse maps: count, then `{filename_len, filename,
//!   name_len, name, index}` per record.
//! - Section 3, normal maps: same record layout.
//! - Section 4, materials: count, then `{MaterialData, table_index,
//!   name_len, name}` per record.
//!
//! A cache is adopted only if every section decodes and the file ends
//! exactly after section 4; a partial or trailing-garbage file is rejected
//! so the loader can fall back to reparsing and rewriting. Decoding then
//! re-encoding a valid cache reproduces it byte for byte.

use glam::Mat4;

use crate::errors::{Result, VeldtError};
use crate::scene::material::{MaterialData, TextureRef};
use crate::scene::mesh::{MeshData, Vertex};

/// A material row as persisted in section 4.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedMaterial {
    pub name: String,
    pub table_index: u32,
    pub data: MaterialData,
}

/// Decoded contents of a scene cache file.
///
/// Meshes come back with empty instance lists and the occluder flag unset;
/// both belong to the scene builder, not to the persisted format.
#[derive(Debug, Clone, Default)]
pub struct SceneCache {
    pub meshes: Vec<MeshData>,
    pub diffuse_maps: Vec<TextureRef>,
    pub normal_maps: Vec<TextureRef>,
    pub materials: Vec<CachedMaterial>,
}

impl SceneCache {
    /// Decode a cache from bytes, validating section counts and that the
    /// buffer ends exactly at the end of section 4.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);

        let mesh_count = r.read_u32("mesh count")?;
        let mut meshes = Vec::with_capacity(mesh_count as usize);
        for _ in 0..mesh_count {
            meshes.push(r.read_mesh()?);
        }

        let diffuse_maps = r.read_texture_section("diffuse map")?;
        let normal_maps = r.read_texture_section("normal map")?;

        let material_count = r.read_u32("material count")?;
        let mut materials = Vec::with_capacity(material_count as usize);
        for _ in 0..material_count {
            let data = r.read_material_data()?;
            let table_index = r.read_u32("material table index")?;
            let name = r.read_string("material name")?;
            materials.push(CachedMaterial {
                name,
                table_index,
                data,
            });
        }

        r.expect_eof()?;

        Ok(Self {
            meshes,
            diffuse_maps,
            normal_maps,
            materials,
        })
    }

    /// Encode to the exact byte layout [`decode`](Self::decode) consumes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();

        write_u32(&mut out, self.meshes.len() as u32);
        for mesh in &self.meshes {
            write_string(&mut out, &mesh.name);
            let vertex_bytes: &[u8] = bytemuck::cast_slice(&mesh.vertices);
            let index_bytes: &[u8] = bytemuck::cast_slice(&mesh.indices);
            write_u32(&mut out, vertex_bytes.len() as u32);
            write_u32(&mut out, index_bytes.len() as u32);
            out.extend_from_slice(vertex_bytes);
            out.extend_from_slice(index_bytes);
            write_u32(&mut out, mesh.material_index);
            out.extend_from_slice(bytemuck::cast_slice(&mesh.world.to_cols_array()));
            out.extend_from_slice(bytemuck::cast_slice(&mesh.tex_transform.to_cols_array()));
        }

        for section in [&self.diffuse_maps, &self.normal_maps] {
            write_u32(&mut out, section.len() as u32);
            for tex in section.iter() {
                write_string(&mut out, &tex.filename);
                write_string(&mut out, &tex.name);
                write_u32(&mut out, tex.index);
            }
        }

        write_u32(&mut out, self.materials.len() as u32);
        for mat in &self.materials {
            out.extend_from_slice(bytemuck::bytes_of(&mat.data));
            write_u32(&mut out, mat.table_index);
            write_string(&mut out, &mat.name);
        }

        out
    }

    /// Read and validate a cache file.
    pub fn read_file(path: &std::path::Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes)
    }

    /// Write the cache file, replacing any previous one.
    pub fn write_file(&self, path: &std::path::Path) -> Result<()> {
        std::fs::write(path, self.encode())?;
        Ok(())
    }
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    write_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

/// Forward byte reader tracking the offset for error reports.
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn fail<T>(&self, reason: impl Into<String>) -> Result<T> {
        Err(VeldtError::CacheDecode {
            offset: self.offset as u64,
            reason: reason.into(),
        })
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(len);
        match end {
            Some(end) if end <= self.bytes.len() => {
                let slice = &self.bytes[self.offset..end];
                self.offset = end;
                Ok(slice)
            }
            _ => self.fail(format!("unexpected end of file reading {what} ({len} bytes)")),
        }
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_string(&mut self, what: &str) -> Result<String> {
        let len = self.read_u32(what)? as usize;
        let bytes = self.take(len, what)?;
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_owned()),
            Err(_) => self.fail(format!("{what} is not valid UTF-8")),
        }
    }

    fn read_mat4(&mut self, what: &str) -> Result<Mat4> {
        let bytes = self.take(16 * 4, what)?;
        let cols: [f32; 16] = bytemuck::pod_read_unaligned(bytes);
        Ok(Mat4::from_cols_array(&cols))
    }

    fn read_mesh(&mut self) -> Result<MeshData> {
        let name = self.read_string("mesh name")?;
        let vertex_bytes = self.read_u32("vertex byte size")? as usize;
        let index_bytes = self.read_u32("index byte size")? as usize;

        if vertex_bytes % std::mem::size_of::<Vertex>() != 0 {
            return self.fail(format!(
                "vertex data of mesh '{name}' is not a whole number of vertices"
            ));
        }
        if index_bytes % 4 != 0 {
            return self.fail(format!(
                "index data of mesh '{name}' is not a whole number of indices"
            ));
        }

        let vertices: Vec<Vertex> =
            bytemuck::pod_collect_to_vec(self.take(vertex_bytes, "vertex data")?);
        let indices: Vec<u32> = bytemuck::pod_collect_to_vec(self.take(index_bytes, "index data")?);

        let material_index = self.read_u32("mesh material index")?;
        let world = self.read_mat4("mesh world matrix")?;
        let tex_transform = self.read_mat4("mesh texture transform")?;

        let mut mesh = MeshData::new(name, vertices, indices);
        mesh.material_index = material_index;
        mesh.world = world;
        mesh.tex_transform = tex_transform;
        Ok(mesh)
    }

    fn read_texture_section(&mut self, what: &str) -> Result<Vec<TextureRef>> {
        let count = self.read_u32(&format!("{what} count"))?;
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let filename = self.read_string(&format!("{what} filename"))?;
            let name = self.read_string(&format!("{what} name"))?;
            let index = self.read_u32(&format!("{what} index"))?;
            out.push(TextureRef {
                filename,
                name,
                index,
            });
        }
        Ok(out)
    }

    fn read_material_data(&mut self) -> Result<MaterialData> {
        let bytes = self.take(std::mem::size_of::<MaterialData>(), "material data")?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    fn expect_eof(&self) -> Result<()> {
        if self.offset == self.bytes.len() {
            Ok(())
        } else {
            self.fail(format!(
                "{} trailing bytes after the material section",
                self.bytes.len() - self.offset
            ))
        }
    }
}
