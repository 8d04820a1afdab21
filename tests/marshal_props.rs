use acoustic_bridge::marshal::{self, ReadView, ViewLedger};
use acoustic_bridge::{SampleFormat, Waveform};
use proptest::prelude::*;

proptest! {
    #[test]
    fn i16_samples_survive_the_byte_view(samples in prop::collection::vec(any::<i16>(), 0..512)) {
        let bytes = marshal::to_bytes(&samples);
        prop_assert_eq!(bytes.len(), samples.len() * 2);
        prop_assert_eq!(marshal::from_bytes::<i16>(&bytes).unwrap(), samples);
    }

    #[test]
    fn f32_samples_survive_the_byte_view(samples in prop::collection::vec(-1.0f32..=1.0, 0..512)) {
        let wave = Waveform::F32(samples.clone());
        let bytes = wave.to_bytes();
        prop_assert_eq!(bytes.len(), samples.len() * 4);
        prop_assert_eq!(Waveform::from_bytes(SampleFormat::F32, &bytes).unwrap(), wave);
    }

    #[test]
    fn read_views_match_owned_conversion(samples in prop::collection::vec(any::<i16>(), 0..256)) {
        let ledger = ViewLedger::new();
        {
            let view = ReadView::acquire(&ledger, &samples);
            let expected = marshal::to_bytes(&samples);
            prop_assert_eq!(view.bytes(), expected.as_slice());
        }
        prop_assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn partial_samples_never_convert(len in 0usize..64) {
        let bytes = vec![0u8; len];
        prop_assert_eq!(Waveform::from_bytes(SampleFormat::I16, &bytes).is_ok(), len % 2 == 0);
        prop_assert_eq!(Waveform::from_bytes(SampleFormat::F32, &bytes).is_ok(), len % 4 == 0);
    }
}
