//! Asset import: scene graphs (OBJ/MTL) and texture decoding.

pub mod obj;
pub mod scene;
pub mod texture;

pub use obj::ObjImporter;
pub use scene::{
    ImportOptions, Material, RawMesh, SceneGraph, SceneImporter, SceneNode, TextureChannel,
};
pub use texture::{DecodedImage, ImageDecoder, PixelDecoder};
