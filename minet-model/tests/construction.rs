use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use minet_core::nn::{Layer, Module, Parameter};
use minet_core::tensor::{ones, zeros};
use minet_core::MinetError;
use minet_model::{Backbone, LightMINet, LightMINetConfig, Vgg16Backbone};
use rand::rngs::StdRng;
use rand::SeedableRng;

mod common;
use common::{image, init_logger, small_config};

#[test]
fn test_swapped_backbone_widths_rejected() -> Result<(), MinetError> {
    init_logger();
    let config = small_config();
    let mut widths = config.encoder_channels;
    widths.swap(1, 2);
    let mut rng = StdRng::seed_from_u64(0);
    let backbone = Vgg16Backbone::new(3, widths, 0.1, 1e-5, &mut rng)?;
    let err = LightMINet::from_backbone(config.clone(), Arc::new(backbone)).err();
    assert_eq!(
        err,
        Some(MinetError::ChannelMismatch {
            operation: "backbone level 2".to_string(),
            expected: config.encoder_channels[1],
            actual: config.encoder_channels[2],
        })
    );
    Ok(())
}

#[test]
fn test_backbone_input_width_rejected() -> Result<(), MinetError> {
    let config = small_config();
    let mut rng = StdRng::seed_from_u64(0);
    let backbone = Vgg16Backbone::new(1, config.encoder_channels, 0.1, 1e-5, &mut rng)?;
    assert!(matches!(
        LightMINet::from_backbone(config, Arc::new(backbone)),
        Err(MinetError::ChannelMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_from_backbone_matches_new_layout() -> Result<(), MinetError> {
    let config = small_config();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let backbone = Vgg16Backbone::new(3, config.encoder_channels, 0.1, 1e-5, &mut rng)?;
    let assembled = LightMINet::from_backbone(config.clone(), Arc::new(backbone))?;
    let built = LightMINet::new(config)?;
    let names = |m: &LightMINet| -> Vec<String> {
        m.named_parameters().into_iter().map(|(n, _)| n).collect()
    };
    assert_eq!(names(&assembled), names(&built));
    assert_eq!(assembled.num_parameters(), built.num_parameters());
    Ok(())
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = small_config();
    config.decoder_channels[0] += 1;
    assert!(matches!(
        LightMINet::new(config),
        Err(MinetError::ChannelMismatch { .. })
    ));
    let config = small_config().with_batch_norm(0.1, 0.0);
    assert!(matches!(
        LightMINet::new(config),
        Err(MinetError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_invalid_inputs_fail_fast() -> Result<(), MinetError> {
    let model = LightMINet::new(small_config())?;
    assert_eq!(
        model.forward(&image(&[1, 1, 32, 32], 0)).err(),
        Some(MinetError::ChannelMismatch {
            operation: "LightMINet input".to_string(),
            expected: 3,
            actual: 1,
        })
    );
    for shape in [[1, 3, 48, 32], [1, 3, 32, 40], [1, 3, 0, 32]] {
        let x = zeros(&shape)?;
        assert!(
            matches!(model.forward_standard(&x), Err(MinetError::InvalidInputShape { .. })),
            "{shape:?} accepted by the standard pass"
        );
        assert!(
            matches!(model.forward_checkpointed(&x), Err(MinetError::InvalidInputShape { .. })),
            "{shape:?} accepted by the checkpointed pass"
        );
    }
    assert!(model.forward(&zeros(&[3, 32, 32])?).is_err());
    Ok(())
}

#[test]
fn test_module_tree() -> Result<(), MinetError> {
    let model = LightMINet::new(small_config())?;
    let children: Vec<String> = model.named_children().into_iter().map(|(n, _)| n).collect();
    assert_eq!(
        children,
        vec![
            "backbone",
            "transform",
            "decoder16",
            "decoder8",
            "decoder4",
            "decoder2",
            "decoder1",
            "classifier",
        ]
    );
    let names: Vec<String> = model.named_parameters().into_iter().map(|(n, _)| n).collect();
    assert!(names.contains(&"classifier.weight".to_string()));
    assert!(names.contains(&"backbone.encoder1.conv1_1.conv.weight".to_string()));
    assert!(names.contains(&"decoder1.sim.h2h_0.weight".to_string()));
    assert!(names.contains(&"transform.level16.finer_proj.conv.weight".to_string()));

    model.set_training(false);
    let out = Layer::forward(&model, &image(&[1, 3, 32, 32], 6))?;
    assert_eq!(out.shape(), vec![1, 1, 32, 32]);
    Ok(())
}

#[test]
fn test_default_config_widths() {
    let config = LightMINetConfig::default();
    assert_eq!(config.encoder_channels, [64, 128, 256, 512, 512]);
    assert_eq!(config.transform_channels, [32, 64, 64, 64, 64]);
    assert!(!config.checkpointing);
}

/// VGG16 with an extra backbone-level parameter that counts mode switches.
#[derive(Debug)]
struct CountingBackbone {
    inner: Vgg16Backbone,
    scale: Parameter,
    switches: AtomicUsize,
}

impl Module for CountingBackbone {
    fn local_parameters(&self) -> Vec<(String, &Parameter)> {
        vec![("scale".to_string(), &self.scale)]
    }

    fn named_children(&self) -> Vec<(String, &dyn Module)> {
        self.inner.named_children()
    }

    fn set_training(&self, training: bool) {
        self.switches.fetch_add(1, Ordering::Relaxed);
        self.inner.set_training(training);
    }
}

impl Backbone for CountingBackbone {
    fn in_channels(&self) -> usize {
        self.inner.in_channels()
    }

    fn out_channels(&self) -> [usize; 5] {
        self.inner.out_channels()
    }

    fn stages(&self) -> [Arc<dyn Layer>; 5] {
        self.inner.stages()
    }

    fn as_module(&self) -> &dyn Module {
        self
    }
}

#[test]
fn test_custom_backbone_is_traversed_through_its_own_impl() -> Result<(), MinetError> {
    let config = small_config();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let inner = Vgg16Backbone::new(3, config.encoder_channels, 0.1, 1e-5, &mut rng)?;
    let backbone = Arc::new(CountingBackbone {
        inner,
        scale: Parameter::new(ones(&[1])?, Some("scale".to_string())),
        switches: AtomicUsize::new(0),
    });
    let model = LightMINet::from_backbone(config, backbone.clone())?;

    model.set_training(false);
    model.set_training(true);
    assert_eq!(backbone.switches.load(Ordering::Relaxed), 2);

    let names: Vec<String> = model.named_parameters().into_iter().map(|(n, _)| n).collect();
    assert!(names.contains(&"backbone.scale".to_string()));
    assert!(names.contains(&"backbone.encoder1.conv1_1.conv.weight".to_string()));
    Ok(())
}
