//! Scene flattening: scene graph in, ordered draw-ready meshes out.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use asset::{
    ImageDecoder, ImportOptions, ObjImporter, PixelDecoder, RawMesh, SceneGraph, SceneImporter,
    SceneNode, TextureChannel,
};
use gfx::SharedDevice;

use crate::error::{ModelError, SceneError, TextureError};
use crate::mesh::Mesh;
use crate::model::Model;
use crate::texture::{Texture, TextureCache, TextureKind};
use crate::vertex::Vertex;

/// Material channels gathered into a mesh's texture list, in list order.
///
/// The height-map channel feeds the `normal` samplers and the ambient channel
/// feeds the `height` samplers. Shaders written against these uniform names
/// depend on the pairing, so it is kept as is.
pub const MATERIAL_SLOTS: [(TextureChannel, TextureKind); 4] = [
    (TextureChannel::Diffuse, TextureKind::Diffuse),
    (TextureChannel::Specular, TextureKind::Specular),
    (TextureChannel::Height, TextureKind::Normal),
    (TextureChannel::Ambient, TextureKind::Height),
];

/// What to do when a referenced texture cannot be loaded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingTexturePolicy {
    /// Abort the model load with [`ModelError::Texture`].
    #[default]
    Fail,
    /// Leave the slot out of the mesh's texture list.
    Skip,
    /// Substitute a checkerboard texture of the same kind.
    Placeholder,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub missing_texture: MissingTexturePolicy,
}

/// Builds [`Model`]s from files through an importer and a pixel decoder.
pub struct ModelLoader<I, D> {
    device: SharedDevice,
    importer: I,
    decoder: D,
    options: LoadOptions,
}

impl ModelLoader<ObjImporter, ImageDecoder> {
    /// Loader for OBJ/MTL scenes with image-crate textures and default options.
    pub fn obj(device: SharedDevice) -> Self {
        Self::new(
            device,
            ObjImporter::new(ImportOptions::default()),
            ImageDecoder::default(),
        )
    }
}

impl<I: SceneImporter, D: PixelDecoder> ModelLoader<I, D> {
    pub fn new(device: SharedDevice, importer: I, decoder: D) -> Self {
        Self {
            device,
            importer,
            decoder,
            options: LoadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> LoadOptions {
        self.options
    }

    /// Loads the scene at `path`.
    ///
    /// A scene that fails to import, is flagged incomplete or lacks a root
    /// yields an empty model (see [`Model::load_failure`]). Texture and mesh
    /// errors are returned.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Model, ModelError> {
        let path = path.as_ref();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut cache = TextureCache::new(Rc::clone(&self.device));

        let scene = match self.importer.import(path) {
            Ok(scene) => scene,
            Err(err) => return Ok(abort(path, directory, cache, SceneError::Import(err))),
        };
        if scene.incomplete {
            return Ok(abort(path, directory, cache, SceneError::Incomplete));
        }
        let Some(root) = scene.root.as_ref() else {
            return Ok(abort(path, directory, cache, SceneError::MissingRoot));
        };

        let mut flattener = Flattener {
            loader: self,
            scene: &scene,
            directory: &directory,
            cache: &mut cache,
            meshes: Vec::new(),
        };
        flattener.visit(root)?;
        let meshes = flattener.meshes;

        log::info!(
            "Loaded model {:?}: {} meshes, {} textures",
            path,
            meshes.len(),
            cache.len()
        );
        Ok(Model::new(meshes, cache, directory))
    }
}

fn abort(path: &Path, directory: PathBuf, cache: TextureCache, reason: SceneError) -> Model {
    log::error!("Failed to load model {:?}: {}", path, reason);
    Model::empty(cache, directory, reason)
}

struct Flattener<'a, I, D> {
    loader: &'a ModelLoader<I, D>,
    scene: &'a SceneGraph,
    directory: &'a Path,
    cache: &'a mut TextureCache,
    meshes: Vec<Mesh>,
}

impl<I: SceneImporter, D: PixelDecoder> Flattener<'_, I, D> {
    /// Pre-order: the node's own meshes, then each child subtree in order.
    fn visit(&mut self, node: &SceneNode) -> Result<(), ModelError> {
        for &index in &node.meshes {
            let Some(raw) = self.scene.meshes.get(index) else {
                log::warn!("Node '{}' references missing mesh {}", node.name, index);
                continue;
            };
            let mesh = self.process_mesh(raw)?;
            self.meshes.push(mesh);
        }
        for child in &node.children {
            self.visit(child)?;
        }
        Ok(())
    }

    fn process_mesh(&mut self, raw: &RawMesh) -> Result<Mesh, ModelError> {
        let vertices: Vec<Vertex> = (0..raw.vertex_count())
            .map(|i| extract_vertex(raw, i))
            .collect();
        let indices: Vec<u32> = raw.faces.iter().flatten().copied().collect();

        let mut textures = Vec::new();
        if let Some(material_index) = raw.material_index {
            match self.scene.materials.get(material_index) {
                Some(material) => {
                    for (channel, kind) in MATERIAL_SLOTS {
                        for relative in material.textures(channel) {
                            if let Some(texture) = self.resolve(relative, kind)? {
                                textures.push(texture);
                            }
                        }
                    }
                }
                None => log::warn!(
                    "Mesh '{}' references missing material {}",
                    raw.name,
                    material_index
                ),
            }
        }

        log::debug!(
            "Mesh '{}': {} vertices, {} indices, {} textures",
            raw.name,
            vertices.len(),
            indices.len(),
            textures.len()
        );
        Mesh::new(
            Rc::clone(&self.loader.device),
            raw.name.as_str(),
            vertices,
            indices,
            textures,
        )
        .map_err(|source| ModelError::Mesh {
            name: raw.name.clone(),
            source,
        })
    }

    fn resolve(
        &mut self,
        relative: &str,
        kind: TextureKind,
    ) -> Result<Option<Rc<Texture>>, ModelError> {
        let full_path = self.directory.join(relative).to_string_lossy().into_owned();
        let err = match self.cache.resolve(&full_path, kind, &self.loader.decoder) {
            Ok(texture) => return Ok(Some(texture)),
            Err(err) => err,
        };

        // Repeat failures were already reported for an earlier mesh.
        let repeated = matches!(err, TextureError::Unavailable { .. });
        match self.loader.options.missing_texture {
            MissingTexturePolicy::Fail => Err(err.into()),
            MissingTexturePolicy::Skip => {
                if !repeated {
                    log::warn!("Skipping {} texture: {}", kind, err);
                }
                Ok(None)
            }
            MissingTexturePolicy::Placeholder => {
                if !repeated {
                    log::warn!("Using placeholder for {} texture: {}", kind, err);
                }
                Ok(Some(self.cache.placeholder(kind)?))
            }
        }
    }
}

/// Copies one vertex into a zeroed record; attributes the source lacks stay zero.
fn extract_vertex(raw: &RawMesh, i: usize) -> Vertex {
    let mut vertex = Vertex {
        position: raw.positions[i],
        ..Vertex::default()
    };
    if let Some(normal) = raw.normals.get(i) {
        vertex.normal = *normal;
    }
    if let Some(uv) = raw.tex_coords.as_ref().and_then(|uvs| uvs.get(i)) {
        vertex.tex_coords = *uv;
    }
    if let Some(tangent) = raw.tangents.as_ref().and_then(|t| t.get(i)) {
        vertex.tangent = *tangent;
    }
    if let Some(bitangent) = raw.bitangents.as_ref().and_then(|b| b.get(i)) {
        vertex.bitangent = *bitangent;
    }
    vertex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDecoder, recording_device};
    use asset::Material;
    use gfx::recording::{DeviceCall, RecordingProgram};

    /// Importer handing out a prepared scene (or an error) regardless of path.
    struct FakeImporter(Option<SceneGraph>);

    impl SceneImporter for FakeImporter {
        fn import(&self, _path: &Path) -> anyhow::Result<SceneGraph> {
            self.0
                .clone()
                .ok_or_else(|| anyhow::anyhow!("unsupported file format"))
        }
    }

    fn raw_mesh(name: &str, material_index: Option<usize>) -> RawMesh {
        RawMesh {
            name: name.to_owned(),
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 4],
            tex_coords: Some(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]),
            tangents: None,
            bitangents: None,
            faces: vec![vec![0, 1, 2], vec![2, 1, 3]],
            material_index,
        }
    }

    fn node(name: &str, meshes: Vec<usize>, children: Vec<SceneNode>) -> SceneNode {
        SceneNode {
            name: name.to_owned(),
            meshes,
            children,
        }
    }

    fn scene(root: SceneNode, meshes: Vec<RawMesh>, materials: Vec<Material>) -> SceneGraph {
        SceneGraph {
            root: Some(root),
            meshes,
            materials,
            incomplete: false,
        }
    }

    fn loader(
        scene: Option<SceneGraph>,
        decoder: FakeDecoder,
    ) -> (Rc<gfx::recording::RecordingDevice>, ModelLoader<FakeImporter, FakeDecoder>) {
        let (device, shared) = recording_device();
        (device, ModelLoader::new(shared, FakeImporter(scene), decoder))
    }

    fn mesh_names(model: &Model) -> Vec<&str> {
        model.meshes().iter().map(Mesh::name).collect()
    }

    #[test]
    fn node_meshes_come_before_children() {
        // A[m0] -> (B[m1] -> D[m3]), C[m2]
        let root = node(
            "A",
            vec![0],
            vec![
                node("B", vec![1], vec![node("D", vec![3], Vec::new())]),
                node("C", vec![2], Vec::new()),
            ],
        );
        let meshes = ["m0", "m1", "m2", "m3"]
            .into_iter()
            .map(|n| raw_mesh(n, None))
            .collect();
        let (_device, loader) = loader(Some(scene(root, meshes, Vec::new())), FakeDecoder::rgba(1, 1));

        let model = loader.load("assets/scene.obj").expect("load");
        assert_eq!(mesh_names(&model), ["m0", "m1", "m3", "m2"]);
    }

    #[test]
    fn two_node_graph_flattens_parent_first() {
        let root = node("A", vec![1], vec![node("B", vec![0], Vec::new())]);
        let meshes = vec![raw_mesh("m2", None), raw_mesh("m1", None)];
        let (_device, loader) = loader(Some(scene(root, meshes, Vec::new())), FakeDecoder::rgba(1, 1));

        let model = loader.load("scene.obj").expect("load");
        assert_eq!(mesh_names(&model), ["m1", "m2"]);
    }

    #[test]
    fn faces_flatten_in_order_within_bounds() {
        let root = node("root", vec![0], Vec::new());
        let (_device, loader) = loader(
            Some(scene(root, vec![raw_mesh("quad", None)], Vec::new())),
            FakeDecoder::rgba(1, 1),
        );

        let model = loader.load("quad.obj").expect("load");
        let mesh = &model.meshes()[0];
        assert_eq!(mesh.indices(), &[0, 1, 2, 2, 1, 3]);
        assert!(
            mesh.indices()
                .iter()
                .all(|&i| (i as usize) < mesh.vertices().len())
        );
    }

    #[test]
    fn missing_attributes_stay_zero() {
        let mut raw = raw_mesh("bare", None);
        raw.tex_coords = None;
        raw.normals.clear();
        let mut with_tangents = raw_mesh("lit", None);
        with_tangents.tangents = Some(vec![[1.0, 0.0, 0.0]; 4]);
        with_tangents.bitangents = Some(vec![[0.0, 1.0, 0.0]; 4]);

        let root = node("root", vec![0, 1], Vec::new());
        let (_device, loader) = loader(
            Some(scene(root, vec![raw, with_tangents], Vec::new())),
            FakeDecoder::rgba(1, 1),
        );
        let model = loader.load("x.obj").expect("load");

        let bare = model.meshes()[0].vertices()[3];
        assert_eq!(bare.position, [1.0, 1.0, 0.0]);
        assert_eq!(bare.normal, [0.0; 3]);
        assert_eq!(bare.tex_coords, [0.0; 2]);
        assert_eq!(bare.tangent, [0.0; 3]);
        assert_eq!(bare.bitangent, [0.0; 3]);

        let lit = model.meshes()[1].vertices()[3];
        assert_eq!(lit.tex_coords, [1.0, 1.0]);
        assert_eq!(lit.tangent, [1.0, 0.0, 0.0]);
        assert_eq!(lit.bitangent, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn material_slots_follow_channel_mapping() {
        let mut material = Material::new("stone");
        material.add_texture(TextureChannel::Ambient, "ao.png");
        material.add_texture(TextureChannel::Normals, "ignored_normals.png");
        material.add_texture(TextureChannel::Height, "bump.png");
        material.add_texture(TextureChannel::Specular, "spec.png");
        material.add_texture(TextureChannel::Diffuse, "albedo.png");
        material.add_texture(TextureChannel::Diffuse, "detail.png");

        let root = node("root", vec![0], Vec::new());
        let decoder = FakeDecoder::rgba(2, 2);
        let (_device, loader) = loader(
            Some(scene(root, vec![raw_mesh("wall", Some(0))], vec![material])),
            decoder,
        );
        let model = loader.load("levels/castle/wall.obj").expect("load");

        let textures = model.meshes()[0].textures();
        let listed: Vec<_> = textures.iter().map(|t| (t.kind(), t.path())).collect();
        assert_eq!(
            listed,
            vec![
                (TextureKind::Diffuse, "levels/castle/albedo.png"),
                (TextureKind::Diffuse, "levels/castle/detail.png"),
                (TextureKind::Specular, "levels/castle/spec.png"),
                (TextureKind::Normal, "levels/castle/bump.png"),
                (TextureKind::Height, "levels/castle/ao.png"),
            ]
        );
    }

    #[test]
    fn shared_texture_is_decoded_once() {
        let mut material = Material::new("wood");
        material.add_texture(TextureChannel::Diffuse, "wood.png");
        let root = node("root", vec![0], vec![node("lid", vec![1], Vec::new())]);
        let meshes = vec![raw_mesh("box", Some(0)), raw_mesh("lid", Some(0))];

        let (device, shared) = recording_device();
        let loader = ModelLoader::new(
            shared,
            FakeImporter(Some(scene(root, meshes, vec![material]))),
            FakeDecoder::rgba(8, 8),
        );
        let model = loader.load("crate/crate.obj").expect("load");

        let a = &model.meshes()[0].textures()[0];
        let b = &model.meshes()[1].textures()[0];
        assert_eq!(a.id(), b.id());
        assert_eq!(loader.decoder.calls(), vec!["crate/wood.png"]);
        assert_eq!(model.textures().len(), 1);
        assert_eq!(device.live_textures(), 1);
    }

    #[test]
    fn import_failure_yields_empty_model() {
        let (device, loader) = loader(None, FakeDecoder::rgba(1, 1));
        let model = loader.load("models/broken.fbx").expect("non-fatal");

        assert!(model.is_empty());
        assert!(matches!(model.load_failure(), Some(SceneError::Import(_))));
        assert_eq!(model.directory(), Path::new("models"));

        let program = RecordingProgram::new();
        model.draw(&program);
        assert!(device.calls().is_empty());
        assert!(program.writes().is_empty());
    }

    #[test]
    fn incomplete_or_rootless_scene_yields_empty_model() {
        let mut incomplete = scene(
            node("root", vec![0], Vec::new()),
            vec![raw_mesh("m", None)],
            Vec::new(),
        );
        incomplete.incomplete = true;
        let (_device, loader_a) = loader(Some(incomplete), FakeDecoder::rgba(1, 1));
        let model = loader_a.load("a.obj").expect("non-fatal");
        assert!(model.is_empty());
        assert!(matches!(model.load_failure(), Some(SceneError::Incomplete)));

        let rootless = SceneGraph {
            root: None,
            meshes: vec![raw_mesh("m", None)],
            ..SceneGraph::default()
        };
        let (_device, loader_b) = loader(Some(rootless), FakeDecoder::rgba(1, 1));
        let model = loader_b.load("b.obj").expect("non-fatal");
        assert!(matches!(model.load_failure(), Some(SceneError::MissingRoot)));
    }

    #[test]
    fn missing_texture_policies() {
        let mut material = Material::new("m");
        material.add_texture(TextureChannel::Diffuse, "gone.png");
        material.add_texture(TextureChannel::Specular, "spec.png");
        let build = || {
            scene(
                node("root", vec![0], Vec::new()),
                vec![raw_mesh("m", Some(0))],
                vec![material.clone()],
            )
        };

        let (_device, fail) = loader(Some(build()), FakeDecoder::rgba(1, 1).failing("gone.png"));
        let err = fail.load("dir/m.obj").expect_err("fail policy");
        assert!(matches!(err, ModelError::Texture(ref e) if e.path() == "dir/gone.png"));

        let (_device, skip) = loader(Some(build()), FakeDecoder::rgba(1, 1).failing("gone.png"));
        let skip = skip.with_options(LoadOptions {
            missing_texture: MissingTexturePolicy::Skip,
        });
        let model = skip.load("dir/m.obj").expect("skip policy");
        let kinds: Vec<_> = model.meshes()[0].textures().iter().map(|t| t.kind()).collect();
        assert_eq!(kinds, [TextureKind::Specular]);

        let (_device, placeholder) = loader(Some(build()), FakeDecoder::rgba(1, 1).failing("gone.png"));
        let placeholder = placeholder.with_options(LoadOptions {
            missing_texture: MissingTexturePolicy::Placeholder,
        });
        let model = placeholder.load("dir/m.obj").expect("placeholder policy");
        let textures = model.meshes()[0].textures();
        assert_eq!(textures.len(), 2);
        assert_eq!(textures[0].path(), crate::texture::PLACEHOLDER_PATH);
        assert_eq!(textures[0].kind(), TextureKind::Diffuse);
        assert_eq!(textures[1].path(), "dir/spec.png");
    }

    #[test]
    fn missing_texture_shared_by_meshes_is_tried_once() {
        let mut material = Material::new("m");
        material.add_texture(TextureChannel::Diffuse, "gone.png");
        let root = node("root", vec![0, 1], vec![node("child", vec![2], Vec::new())]);
        let meshes = vec![
            raw_mesh("a", Some(0)),
            raw_mesh("b", Some(0)),
            raw_mesh("c", Some(0)),
        ];

        for policy in [MissingTexturePolicy::Skip, MissingTexturePolicy::Placeholder] {
            let (_device, shared) = recording_device();
            let loader = ModelLoader::new(
                shared,
                FakeImporter(Some(scene(root.clone(), meshes.clone(), vec![material.clone()]))),
                FakeDecoder::rgba(1, 1).failing("gone.png"),
            )
            .with_options(LoadOptions {
                missing_texture: policy,
            });

            let model = loader.load("dir/m.obj").expect("non-fatal policy");
            assert_eq!(model.meshes().len(), 3);
            assert_eq!(loader.decoder.calls(), vec!["dir/gone.png"]);
            assert!(model.textures().has_failed("dir/gone.png"));
        }
    }

    #[test]
    fn bad_face_index_fails_the_load() {
        let mut raw = raw_mesh("broken", None);
        raw.faces.push(vec![0, 1, 9]);
        let (_device, loader) = loader(
            Some(scene(node("root", vec![0], Vec::new()), vec![raw], Vec::new())),
            FakeDecoder::rgba(1, 1),
        );
        let err = loader.load("x.obj").expect_err("index 9");
        assert!(matches!(err, ModelError::Mesh { ref name, .. } if name == "broken"));
    }

    #[test]
    fn single_diffuse_mesh_end_to_end() {
        let mut material = Material::new("painted");
        material.add_texture(TextureChannel::Diffuse, "paint.png");
        let (device, loader) = loader(
            Some(scene(
                node("root", vec![0], Vec::new()),
                vec![raw_mesh("panel", Some(0))],
                vec![material],
            )),
            FakeDecoder::rgba(4, 4),
        );

        let model = loader.load("props/panel.obj").expect("load");
        assert_eq!(model.meshes().len(), 1);
        let mesh = &model.meshes()[0];
        assert_eq!(mesh.textures().len(), 1);
        assert_eq!(mesh.textures()[0].kind().label(), "diffuse");

        device.clear_calls();
        let program = RecordingProgram::new();
        model.draw(&program);

        assert_eq!(program.names(), ["texture_diffuse1"]);
        assert_eq!(
            device.draw_calls(),
            vec![
                DeviceCall::ActiveTexture(0),
                DeviceCall::BindTexture(mesh.textures()[0].id()),
                DeviceCall::BindVertexArray(Some(mesh.vertex_array())),
                DeviceCall::DrawElements(mesh.indices().len() as u32),
                DeviceCall::BindVertexArray(None),
                DeviceCall::ActiveTexture(0),
            ]
        );
    }

    #[test]
    fn dropping_model_releases_gpu_objects() {
        let mut material = Material::new("m");
        material.add_texture(TextureChannel::Diffuse, "a.png");
        let (device, loader) = loader(
            Some(scene(
                node("root", vec![0, 1], Vec::new()),
                vec![raw_mesh("a", Some(0)), raw_mesh("b", Some(0))],
                vec![material],
            )),
            FakeDecoder::rgba(1, 1),
        );
        let model = loader.load("m.obj").expect("load");
        assert_eq!(device.live_vertex_arrays(), 2);
        assert_eq!(device.live_textures(), 1);

        drop(model);
        assert_eq!(device.live_vertex_arrays(), 0);
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn loads_obj_and_png_from_disk() {
        let dir = std::env::temp_dir().join(format!("model-loader-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("tex")).expect("temp dir");
        std::fs::write(
            dir.join("plane.obj"),
            "mtllib plane.mtl\nv 0 0 0\nv 1 0 0\nv 1 1 0\nvt 0 0\nvt 1 0\nvt 1 1\nvn 0 0 1\n\
             o plane\nusemtl painted\nf 1/1/1 2/2/1 3/3/1\n",
        )
        .expect("write obj");
        std::fs::write(dir.join("plane.mtl"), "newmtl painted\nmap_Kd tex/paint.png\n")
            .expect("write mtl");
        image::RgbImage::from_pixel(2, 3, image::Rgb([10, 20, 30]))
            .save(dir.join("tex/paint.png"))
            .expect("write png");

        let (device, shared) = recording_device();
        let model = ModelLoader::obj(shared)
            .load(dir.join("plane.obj"))
            .expect("load from disk");
        std::fs::remove_dir_all(&dir).ok();

        assert!(model.load_failure().is_none());
        assert_eq!(model.meshes().len(), 1);
        let mesh = &model.meshes()[0];
        assert_eq!(mesh.vertices().len(), 3);
        assert_eq!(mesh.indices(), &[0, 1, 2]);
        let texture = &mesh.textures()[0];
        assert_eq!(texture.kind(), TextureKind::Diffuse);
        assert_eq!((texture.width(), texture.height()), (2, 3));
        assert!(device.calls().iter().any(|call| matches!(
            call,
            DeviceCall::CreateTexture {
                format: gfx::PixelFormat::Rgb8,
                ..
            }
        )));
    }
}
