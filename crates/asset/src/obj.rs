//! Wavefront OBJ/MTL importer producing a [`SceneGraph`].
//!
//! Each `o`/`g` statement opens a child node under a synthetic root; `usemtl`
//! starts a new mesh inside the current node so that every mesh carries at
//! most one material.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result, anyhow};

use crate::scene::{
    ImportOptions, Material, RawMesh, SceneGraph, SceneImporter, SceneNode, TextureChannel,
};

/// Importer for `.obj` files with optional `mtllib` materials.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObjImporter {
    pub options: ImportOptions,
}

impl ObjImporter {
    pub fn new(options: ImportOptions) -> Self {
        Self { options }
    }
}

impl SceneImporter for ObjImporter {
    fn import(&self, path: &Path) -> Result<SceneGraph> {
        load_obj_from_path(path, self.options)
    }
}

/// Load an OBJ scene; material libraries resolve relative to the file's directory.
pub fn load_obj_from_path(path: impl AsRef<Path>, options: ImportOptions) -> Result<SceneGraph> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open OBJ file: {}", path.display()))?;
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let root_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_owned());

    let mut load_library = |name: &str| -> Result<Vec<Material>> {
        let lib_path = dir.join(name);
        match File::open(&lib_path) {
            Ok(file) => parse_mtl(BufReader::new(file))
                .with_context(|| format!("Failed to parse MTL file: {}", lib_path.display())),
            Err(err) => {
                log::warn!("Material library {:?} unavailable: {}", lib_path, err);
                Ok(Vec::new())
            }
        }
    };

    let scene = load_obj_from_reader(BufReader::new(file), &root_name, options, &mut load_library)?;
    log::info!(
        "Imported {:?}: {} meshes, {} materials",
        path,
        scene.meshes.len(),
        scene.materials.len()
    );
    Ok(scene)
}

/// Parse OBJ source text; `mtllib` statements are resolved against `materials`.
pub fn load_obj_from_str(
    contents: &str,
    options: ImportOptions,
    materials: &[(&str, &str)],
) -> Result<SceneGraph> {
    let mut load_library = |name: &str| -> Result<Vec<Material>> {
        match materials.iter().find(|(lib, _)| *lib == name) {
            Some((_, src)) => parse_mtl(io::Cursor::new(*src)),
            None => {
                log::warn!("Material library '{}' unavailable", name);
                Ok(Vec::new())
            }
        }
    };
    load_obj_from_reader(io::Cursor::new(contents), "root", options, &mut load_library)
}

/// Parse OBJ data from a [`BufRead`] implementation.
pub fn load_obj_from_reader<R: BufRead>(
    reader: R,
    root_name: &str,
    options: ImportOptions,
    load_library: &mut dyn FnMut(&str) -> Result<Vec<Material>>,
) -> Result<SceneGraph> {
    let mut parser = ObjParser::new(options);

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let tag = parts
            .next()
            .ok_or_else(|| anyhow!("Malformed OBJ line {}: '{}'", line_no + 1, trimmed))?;

        match tag {
            "v" => {
                let x = parse_f32(parts.next(), line_no, "x coordinate")?;
                let y = parse_f32(parts.next(), line_no, "y coordinate")?;
                let z = parse_f32(parts.next(), line_no, "z coordinate")?;
                parser.positions.push([x, y, z]);
            }
            "vt" => {
                let u = parse_f32(parts.next(), line_no, "u coordinate")?;
                // 1D textures omit v
                let v = match parts.next() {
                    Some(token) => parse_f32(Some(token), line_no, "v coordinate")?,
                    None => 0.0,
                };
                parser.texcoords.push([u, v]);
            }
            "vn" => {
                let nx = parse_f32(parts.next(), line_no, "nx coordinate")?;
                let ny = parse_f32(parts.next(), line_no, "ny coordinate")?;
                let nz = parse_f32(parts.next(), line_no, "nz coordinate")?;
                parser.normals.push([nx, ny, nz]);
            }
            "f" => parser.face(parts, line_no)?,
            "o" | "g" => {
                let name = rest_of_line(trimmed, tag);
                parser.begin_node(if name.is_empty() { tag } else { name });
            }
            "usemtl" => parser.use_material(rest_of_line(trimmed, tag)),
            "mtllib" => {
                for lib in parts {
                    let loaded = load_library(lib)?;
                    parser.add_materials(loaded);
                }
            }
            _ => {
                // s, l, p and vendor extensions carry nothing we draw
            }
        }
    }

    Ok(parser.finish(root_name))
}

/// Parse an MTL material library.
pub fn parse_mtl<R: BufRead>(reader: R) -> Result<Vec<Material>> {
    let mut materials: Vec<Material> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read MTL line {}", line_no + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some(tag) = trimmed.split_whitespace().next() else {
            continue;
        };

        if tag == "newmtl" {
            materials.push(Material::new(rest_of_line(trimmed, tag)));
            continue;
        }

        let channel = match tag {
            "map_Kd" => TextureChannel::Diffuse,
            "map_Ks" => TextureChannel::Specular,
            "map_Ka" => TextureChannel::Ambient,
            "map_Bump" | "map_bump" | "bump" => TextureChannel::Height,
            "norm" | "map_Kn" => TextureChannel::Normals,
            _ => continue,
        };
        // Map statements may carry options (-bm 1.0 ...); the file name comes last.
        let file = trimmed
            .split_whitespace()
            .last()
            .filter(|token| *token != tag)
            .ok_or_else(|| anyhow!("Missing texture path on MTL line {}", line_no + 1))?;
        let material = materials
            .last_mut()
            .ok_or_else(|| anyhow!("'{}' before any newmtl on MTL line {}", tag, line_no + 1))?;
        material.add_texture(channel, file.replace('\\', "/"));
    }

    Ok(materials)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
struct Key(usize, Option<usize>, Option<usize>);

/// Mesh under construction; vertices are deduplicated per mesh.
#[derive(Default)]
struct MeshBuilder {
    material: Option<usize>,
    unique: HashMap<Key, u32>,
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    has_normals: bool,
    has_uvs: bool,
    faces: Vec<Vec<u32>>,
}

struct NodeBuilder {
    name: String,
    meshes: Vec<usize>,
}

struct ObjParser {
    options: ImportOptions,
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    texcoords: Vec<[f32; 2]>,
    materials: Vec<Material>,
    meshes: Vec<RawMesh>,
    nodes: Vec<NodeBuilder>,
    node: NodeBuilder,
    current: MeshBuilder,
}

impl ObjParser {
    fn new(options: ImportOptions) -> Self {
        Self {
            options,
            positions: Vec::new(),
            normals: Vec::new(),
            texcoords: Vec::new(),
            materials: Vec::new(),
            meshes: Vec::new(),
            nodes: Vec::new(),
            node: NodeBuilder {
                name: "default".to_owned(),
                meshes: Vec::new(),
            },
            current: MeshBuilder::default(),
        }
    }

    fn add_materials(&mut self, loaded: Vec<Material>) {
        self.materials.extend(loaded);
    }

    fn begin_node(&mut self, name: &str) {
        let material = self.current.material;
        self.flush_mesh();
        let finished = std::mem::replace(
            &mut self.node,
            NodeBuilder {
                name: name.to_owned(),
                meshes: Vec::new(),
            },
        );
        self.nodes.push(finished);
        // usemtl state carries across groups
        self.current.material = material;
    }

    fn use_material(&mut self, name: &str) {
        self.flush_mesh();
        let index = match self.materials.iter().position(|m| m.name == name) {
            Some(index) => index,
            None => {
                log::warn!("Material '{}' not declared in any mtllib", name);
                self.materials.push(Material::new(name));
                self.materials.len() - 1
            }
        };
        self.current.material = Some(index);
    }

    fn face<'a>(&mut self, parts: impl Iterator<Item = &'a str>, line_no: usize) -> Result<()> {
        let mut face_indices: Vec<u32> = Vec::new();
        for part in parts {
            let (vi, vti, vni) = parse_face_vertex(
                part,
                self.positions.len(),
                self.texcoords.len(),
                self.normals.len(),
                line_no,
            )?;
            face_indices.push(self.vertex_index(Key(vi, vti, vni), line_no)?);
        }

        if face_indices.len() < 3 {
            return Ok(());
        }
        if self.options.triangulate {
            // Triangulate fan
            for tri in 1..(face_indices.len() - 1) {
                self.current.faces.push(vec![
                    face_indices[0],
                    face_indices[tri],
                    face_indices[tri + 1],
                ]);
            }
        } else {
            self.current.faces.push(face_indices);
        }
        Ok(())
    }

    fn vertex_index(&mut self, key: Key, line_no: usize) -> Result<u32> {
        if let Some(&idx) = self.current.unique.get(&key) {
            return Ok(idx);
        }
        let Key(vi, vti, vni) = key;
        let position = self
            .positions
            .get(vi)
            .copied()
            .ok_or_else(|| anyhow!("Position index out of bounds on line {}", line_no + 1))?;
        let uv = vti.and_then(|i| self.texcoords.get(i).copied());
        let normal = vni.and_then(|i| self.normals.get(i).copied());

        let mesh = &mut self.current;
        let idx = u32::try_from(mesh.positions.len())
            .map_err(|_| anyhow!("Too many vertices in OBJ mesh (>{})", u32::MAX))?;
        mesh.has_uvs |= uv.is_some();
        mesh.has_normals |= normal.is_some();
        mesh.positions.push(position);
        mesh.uvs.push(uv.unwrap_or([0.0, 0.0]));
        mesh.normals.push(normal.unwrap_or([0.0, 0.0, 1.0]));
        mesh.unique.insert(key, idx);
        Ok(idx)
    }

    fn flush_mesh(&mut self) {
        let builder = std::mem::take(&mut self.current);
        if builder.faces.is_empty() {
            return;
        }
        let node = &mut self.node;
        let name = format!("{}#{}", node.name, node.meshes.len());

        let mut uvs = builder.uvs;
        if self.options.flip_uvs {
            for uv in &mut uvs {
                uv[1] = 1.0 - uv[1];
            }
        }

        let (tangents, bitangents) = if self.options.calc_tangent_space && builder.has_uvs {
            let (t, b) = tangent_space(&builder.positions, &uvs, &builder.faces);
            (Some(t), Some(b))
        } else {
            (None, None)
        };

        log::debug!(
            "OBJ mesh '{}': {} vertices, {} faces",
            name,
            builder.positions.len(),
            builder.faces.len()
        );
        node.meshes.push(self.meshes.len());
        self.meshes.push(RawMesh {
            name,
            positions: builder.positions,
            normals: if builder.has_normals {
                builder.normals
            } else {
                Vec::new()
            },
            tex_coords: builder.has_uvs.then_some(uvs),
            tangents,
            bitangents,
            faces: builder.faces,
            material_index: builder.material,
        });
    }

    fn finish(mut self, root_name: &str) -> SceneGraph {
        self.flush_mesh();
        self.nodes.push(self.node);
        let mut root = SceneNode::new(root_name);
        root.children = self
            .nodes
            .into_iter()
            .filter(|node| !node.meshes.is_empty())
            .map(|node| SceneNode {
                name: node.name,
                meshes: node.meshes,
                children: Vec::new(),
            })
            .collect();

        SceneGraph {
            root: Some(root),
            incomplete: self.meshes.is_empty(),
            meshes: self.meshes,
            materials: self.materials,
        }
    }
}

/// Per-vertex tangents and bitangents accumulated over every triangle of each face.
fn tangent_space(
    positions: &[[f32; 3]],
    uvs: &[[f32; 2]],
    faces: &[Vec<u32>],
) -> (Vec<[f32; 3]>, Vec<[f32; 3]>) {
    let mut tangents = vec![[0.0f32; 3]; positions.len()];
    let mut bitangents = vec![[0.0f32; 3]; positions.len()];

    for face in faces.iter().filter(|f| f.len() >= 3) {
        for tri in 1..(face.len() - 1) {
            let [i0, i1, i2] = [face[0], face[tri], face[tri + 1]].map(|i| i as usize);
            let e1 = sub(positions[i1], positions[i0]);
            let e2 = sub(positions[i2], positions[i0]);
            let (du1, dv1) = (uvs[i1][0] - uvs[i0][0], uvs[i1][1] - uvs[i0][1]);
            let (du2, dv2) = (uvs[i2][0] - uvs[i0][0], uvs[i2][1] - uvs[i0][1]);

            let det = du1 * dv2 - du2 * dv1;
            if det.abs() < f32::EPSILON {
                continue;
            }
            let r = 1.0 / det;
            let t = scale(sub(scale(e1, dv2), scale(e2, dv1)), r);
            let b = scale(sub(scale(e2, du1), scale(e1, du2)), r);
            for i in [i0, i1, i2] {
                tangents[i] = add(tangents[i], t);
                bitangents[i] = add(bitangents[i], b);
            }
        }
    }

    tangents.iter_mut().for_each(|v| *v = normalize(*v));
    bitangents.iter_mut().for_each(|v| *v = normalize(*v));
    (tangents, bitangents)
}

fn add(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn scale(a: [f32; 3], s: f32) -> [f32; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

fn normalize(a: [f32; 3]) -> [f32; 3] {
    let len = (a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sqrt();
    if len > f32::EPSILON {
        scale(a, 1.0 / len)
    } else {
        a
    }
}

fn rest_of_line<'a>(line: &'a str, tag: &str) -> &'a str {
    line[tag.len()..].trim()
}

fn parse_f32(value: Option<&str>, line_no: usize, what: &str) -> Result<f32> {
    let token = value.ok_or_else(|| anyhow!("Missing {} on line {}", what, line_no + 1))?;
    token
        .parse::<f32>()
        .with_context(|| format!("Failed to parse {} on line {}", what, line_no + 1))
}

fn parse_face_vertex(
    token: &str,
    pos_count: usize,
    tex_count: usize,
    norm_count: usize,
    line_no: usize,
) -> Result<(usize, Option<usize>, Option<usize>)> {
    let mut split = token.split('/');
    let pos = split
        .next()
        .ok_or_else(|| anyhow!("Malformed face element '{}' on line {}", token, line_no + 1))?;
    let pos_idx = resolve_index(pos, pos_count, line_no)?;

    let tex_idx = match split.next() {
        Some(value) if !value.is_empty() => Some(resolve_index(value, tex_count, line_no)?),
        _ => None,
    };

    let norm_idx = match split.next() {
        Some(value) if !value.is_empty() => Some(resolve_index(value, norm_count, line_no)?),
        _ => None,
    };

    Ok((pos_idx, tex_idx, norm_idx))
}

fn resolve_index(token: &str, len: usize, line_no: usize) -> Result<usize> {
    let raw = token
        .parse::<i32>()
        .with_context(|| format!("Invalid index '{}' on line {}", token, line_no + 1))?;
    if raw == 0 {
        anyhow::bail!("OBJ indices are 1-based; found 0 on line {}", line_no + 1);
    }

    let idx = if raw > 0 {
        (raw - 1) as isize
    } else {
        (len as isize) + (raw as isize)
    };

    if idx < 0 || idx as usize >= len {
        anyhow::bail!(
            "OBJ index {} resolved out of bounds (len={}) on line {}",
            raw,
            len,
            line_no + 1
        );
    }

    Ok(idx as usize)
}
