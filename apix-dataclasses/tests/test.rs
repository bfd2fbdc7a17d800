#[cfg(test)]
pub mod tests {

  use std::collections::HashSet;

  use apix_dataclasses::calibrations::{CounterMap,
                                       SCurveTable,
                                       TrimSearch,
                                       TrimStep,
                                       amplitude_steps,
                                       count_group_hits,
                                       count_pixel_hits};
  use apix_dataclasses::constants::{GROUP_HEIGHT,
                                    GROUP_WIDTH,
                                    NCOL_M1,
                                    NROW_M1,
                                    TRIM_ITERATION_CAP,
                                    TRIM_MAX};
  use apix_dataclasses::events::{ControlRecord,
                                 PixelHit,
                                 Word,
                                 decode_hit,
                                 gray_decode};
  use apix_dataclasses::errors::ConfigError;
  use apix_dataclasses::io::{Event,
                             WordStreamer};
  use apix_dataclasses::matrix::{ApixMatrix,
                                 MatrixFlavor};
  use apix_dataclasses::threading::{RunState,
                                    RunToken};

  /// standard reflected Gray encoding
  fn gray_encode(value : u32) -> u32 {
    value ^ (value >> 1)
  }

  fn hit_word(col : u32, row : u32, ts1 : u32, ts2 : u32) -> u32 {
    (1 << 31) | (col << 25) | (row << 16) | (ts1 << 6) | ts2
  }

  #[test]
  fn gray_decode_inverts_the_encoding() {
    for value in 0..1024u32 {
      assert_eq!(gray_decode(gray_encode(value), 10), value);
    }
    for value in 0..64u32 {
      assert_eq!(gray_decode(gray_encode(value), 6), value);
    }
  }

  #[test]
  fn hit_words_decode_to_their_fields() {
    // ckdivend2 = 1 and disabled Gray decoding make the
    // field extraction directly visible
    let word = hit_word(21, 300, 777, 42);
    let hit  = decode_hit(word, 1, true);
    assert_eq!(hit.col, 21);
    assert_eq!(hit.row, 300);
    assert_eq!(hit.ts1, 777);
    assert_eq!(hit.ts2, 42);
  }

  #[test]
  fn hit_words_gray_decode_their_timestamps() {
    let word = hit_word(3, 17, gray_encode(600), gray_encode(33));
    let hit  = decode_hit(word, 1, false);
    assert_eq!(hit.ts1, 600);
    assert_eq!(hit.ts2, 33);
  }

  #[test]
  fn tot_accounts_for_the_rollover() {
    // with ckdivend2 = 1 the scaled ts1 equals ts1 mod 64
    let hit = decode_hit(hit_word(0, 0, 60, 2), 1, true);
    assert_eq!(hit.tot, 6);
    let hit = decode_hit(hit_word(0, 0, 5, 40), 1, true);
    assert_eq!(hit.tot, 35);
    // the boundary case wraps to zero
    let hit = decode_hit(hit_word(0, 0, 13, 13), 1, true);
    assert_eq!(hit.tot, 0);
  }

  #[test]
  fn tot_respects_the_clock_divider() {
    // ckdivend2 = 0 runs ts1 at twice the ts2 clock
    let hit = decode_hit(hit_word(0, 0, 10, 30), 0, true);
    assert_eq!(hit.tot, 10);
  }

  #[test]
  fn classification_is_total_and_stable() {
    let samples = [0x0000_0000u32,
                   0x0000_0005,
                   0x8000_0000,
                   0xFFFF_FFFF,
                   0x7FFF_FFFF,
                   0x1000_0007,
                   0xDEAD_BEEF];
    for word in samples {
      let first  = Word::classify(word);
      let second = Word::classify(word);
      assert_eq!(first, second);
      match first {
        Word::Hit(raw)    => assert_eq!(raw >> 31, 1),
        Word::Control(_)  => assert_eq!(word >> 31, 0),
      }
    }
  }

  #[test]
  fn unrecognized_tags_classify_to_unknown() {
    match Word::classify(0x0500_0042) {
      Word::Control(ControlRecord::Unknown(tag)) => assert_eq!(tag, 0x05),
      other => panic!("expected an unknown control record, got {:?}", other),
    }
  }

  #[test]
  fn four_fragments_reassemble_the_timestamp() {
    let mut streamer = WordStreamer::new(1, true);
    // low 24 bits of the trigger counter
    streamer.consume(0x1034_5678);
    // high byte 0x9A plus timestamp bits 63:48 = 0xBEEF
    streamer.consume(0x309A_BEEF);
    // timestamp bits 47:24
    streamer.consume(0x2012_3456);
    // timestamp bits 23:0 - completes the record
    streamer.consume(0x6065_4321);
    let mut triggers = Vec::new();
    loop {
      match streamer.next() {
        None     => break,
        Some(ev) => {
          if let Event::Trigger(trg) = ev {
            triggers.push(trg);
          }
        }
      }
    }
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].trigger_count, 0x9A34_5678);
    assert_eq!(triggers[0].fpga_ts, 0xBEEF_1234_5665_4321);
  }

  #[test]
  fn partial_sequences_never_emit_a_trigger() {
    let mut streamer = WordStreamer::new(1, true);
    streamer.consume(0x1034_5678);
    streamer.consume(0x309A_BEEF);
    streamer.consume(0x2012_3456);
    // no TimestampEnd
    loop {
      match streamer.next() {
        None     => break,
        Some(ev) => {
          if let Event::Trigger(_) = ev {
            panic!("a trigger must not appear before the closing fragment");
          }
        }
      }
    }
    assert!(streamer.is_assembling());
    // a stream restart discards the partial value
    streamer.reset();
    assert!(!streamer.is_assembling());
    streamer.consume(0x6000_0001);
    match streamer.next() {
      Some(Event::Trigger(trg)) => {
        assert_eq!(trg.fpga_ts, 1);
        assert_eq!(trg.trigger_count, 0);
      }
      other => panic!("expected a trigger, got {:?}", other),
    }
  }

  #[test]
  fn six_word_stream_yields_one_trigger_and_no_hits() {
    let words = [0x0000_0005u32,
                 0x0100_0003,
                 0x1000_0007,
                 0x3000_0102,
                 0x2000_0304,
                 0x6000_0506];
    let mut streamer = WordStreamer::new(1, true);
    let mut hits     = 0usize;
    let mut triggers = Vec::new();
    for word in words {
      streamer.consume(word);
    }
    loop {
      match streamer.next() {
        None     => break,
        Some(ev) => {
          match ev {
            Event::Hit(_)       => hits += 1,
            Event::Trigger(trg) => triggers.push(trg),
            _                   => (),
          }
        }
      }
    }
    assert_eq!(hits, 0);
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].trigger_count, 7);
    assert_eq!(triggers[0].fpga_ts, 0x0102_0003_0400_0506);
  }

  #[test]
  fn hits_carry_the_last_completed_trigger() {
    let mut streamer = WordStreamer::new(1, true);
    streamer.consume(0x1000_0007);
    streamer.consume(0x3000_0102);
    streamer.consume(0x2000_0304);
    streamer.consume(0x6000_0506);
    // a fresh fragment opens the next record but must not
    // leak into the hit
    streamer.consume(0x1000_00FF);
    streamer.consume(hit_word(2, 3, 0, 0));
    let mut hit : Option<PixelHit> = None;
    loop {
      match streamer.next() {
        None     => break,
        Some(ev) => {
          if let Event::Hit(h) = ev {
            hit = Some(h);
          }
        }
      }
    }
    let hit = hit.expect("the hit word has to decode");
    assert_eq!(hit.fpga_ts, 0x0102_0003_0400_0506);
    assert_eq!(hit.trigger_count, 7);
  }

  #[test]
  fn t0_restarts_the_timestamp_base() {
    let mut streamer = WordStreamer::new(1, true);
    streamer.consume(0x1000_0007);
    streamer.consume(0x3000_0102);
    streamer.consume(0x7000_0042);
    streamer.consume(hit_word(0, 0, 0, 0));
    let mut saw_t0 = false;
    let mut hit : Option<PixelHit> = None;
    loop {
      match streamer.next() {
        None     => break,
        Some(ev) => {
          match ev {
            Event::T0(ts)  => {
              assert_eq!(ts, 0x42);
              saw_t0 = true;
            }
            Event::Hit(h)  => hit = Some(h),
            Event::Trigger(_) => panic!("T0 must not complete a trigger record"),
            _              => (),
          }
        }
      }
    }
    assert!(saw_t0);
    assert_eq!(hit.expect("the hit word has to decode").fpga_ts, 0x42);
  }

  #[test]
  fn trim_search_terminates_for_any_hit_function() {
    // a few deterministic responses: dead pixel, noisy
    // pixel, perfectly tuned pixel, oscillating counts
    let npulses = 100u32;

    let mut search = TrimSearch::new();
    let mut steps  = 0;
    loop {
      steps += 1;
      match search.advance(0, npulses) {
        TrimStep::Continue => continue,
        verdict            => {
          assert_eq!(verdict, TrimStep::Saturated);
          break;
        }
      }
    }
    assert!(steps <= TRIM_ITERATION_CAP);
    assert_eq!(search.trim, 0);

    let mut search = TrimSearch::new();
    assert_eq!(search.advance(5000, npulses), TrimStep::Masked);

    let mut search = TrimSearch::new();
    assert_eq!(search.advance(50, npulses), TrimStep::Converged);
    assert_eq!(search.trim, 4);
  }

  #[test]
  fn trim_search_honors_the_iteration_cap() {
    let npulses    = 100u32;
    let mut search = TrimSearch::new();
    let mut steps  = 0u32;
    // alternating dead and saturated counts never converge
    // and never pin the trim
    loop {
      steps += 1;
      let nhits = if steps % 2 == 1 { 0 } else { npulses };
      match search.advance(nhits, npulses) {
        TrimStep::Continue => {
          assert!(search.trim <= TRIM_MAX);
          continue;
        }
        verdict => {
          assert_eq!(verdict, TrimStep::CapReached);
          break;
        }
      }
    }
    assert_eq!(steps, TRIM_ITERATION_CAP);
    assert!(search.trim <= TRIM_MAX);
  }

  #[test]
  fn injection_groups_partition_the_matrix() {
    let mut seen = HashSet::<(u32, u32)>::new();
    for mask_x in 0..GROUP_WIDTH {
      for mask_y in 0..GROUP_HEIGHT {
        for col in 0..NCOL_M1 {
          for row in 0..NROW_M1 {
            if (col + mask_x) % GROUP_WIDTH == 0 && (row + mask_y) % GROUP_HEIGHT == 0 {
              assert!(seen.insert((col, row)),
                      "pixel ({},{}) scanned twice", col, row);
            }
          }
        }
      }
    }
    assert_eq!(seen.len(), (NCOL_M1 * NROW_M1) as usize);
  }

  #[test]
  fn scurve_table_covers_every_pixel_once() {
    let npoints   = 5;
    let mut table = SCurveTable::new(0.1, 0.5, npoints);
    for mask_x in 0..GROUP_WIDTH {
      for mask_y in 0..GROUP_HEIGHT {
        let step_counts = vec![CounterMap::new(); npoints];
        table.record_group(NCOL_M1, NROW_M1,
                           GROUP_WIDTH, GROUP_HEIGHT,
                           mask_x, mask_y,
                           &step_counts);
      }
    }
    assert!(table.is_complete(NCOL_M1, NROW_M1));
    assert_eq!(table.counts.len(), (NCOL_M1 * NROW_M1) as usize);
    for counts in table.counts.values() {
      assert_eq!(counts.len(), npoints);
    }
  }

  #[test]
  fn amplitude_steps_are_linearly_spaced() {
    let steps = amplitude_steps(0.1, 0.5, 5);
    assert_eq!(steps.len(), 5);
    assert!((steps[0] - 0.1).abs() < 1e-9);
    assert!((steps[4] - 0.5).abs() < 1e-9);
    assert!((steps[1] - 0.2).abs() < 1e-9);
  }

  #[test]
  fn group_counting_only_sees_the_selected_group() {
    let mut in_group = PixelHit::new();
    in_group.col = 5;
    in_group.row = 25;
    let mut outside = PixelHit::new();
    outside.col = 6;
    outside.row = 25;
    let data = vec![in_group, in_group, outside];
    let mut counts = CounterMap::new();
    // mask (0, 0) selects cols 0, 5, 10, .. and rows 0, 25, ..
    let hot = count_group_hits(&data, 0, 0, GROUP_WIDTH, GROUP_HEIGHT, &mut counts);
    assert!(hot.is_empty());
    assert_eq!(counts.get(&(5, 25)), Some(&2));
    assert_eq!(counts.get(&(6, 25)), None);
    assert_eq!(count_pixel_hits(&data, 5, 25), 2);
  }

  #[test]
  fn trim_search_accepts_a_custom_band() {
    let npulses    = 100u32;
    // a wide band converges on the first burst
    let mut search = TrimSearch::with_band(0.5, 0.4);
    assert_eq!(search.advance(85, npulses), TrimStep::Converged);
    assert_eq!(search.trim, 4);
  }

  #[test]
  fn the_matrix_keeps_trim_and_mask_together() {
    let mut matrix = ApixMatrix::new(MatrixFlavor::M1);
    assert_eq!(matrix.ncol, NCOL_M1);
    assert_eq!(matrix.nrow, NROW_M1);
    matrix.set_trim(3, 17, 5);
    assert_eq!(matrix.trim(3, 17), 5);
    assert!(!matrix.is_masked(3, 17));
    matrix.mask_pixel(3, 17);
    assert!(matrix.is_masked(3, 17));
    // a new trim value keeps the sticky mask bit
    matrix.set_trim(3, 17, 2);
    assert_eq!(matrix.trim(3, 17), 2);
    assert!(matrix.is_masked(3, 17));
    assert_eq!(matrix.masked_pixels(), vec![(3, 17)]);
  }

  #[test]
  fn unknown_register_names_are_an_error() {
    let mut matrix = ApixMatrix::new(MatrixFlavor::M1);
    assert!(matrix.set_register("ckdivend2", 3).is_ok());
    assert_eq!(matrix.ckdivend2, 3);
    match matrix.set_register("vpwiggle", 1) {
      Err(ConfigError::UnknownRegister(name)) => assert_eq!(name, "vpwiggle"),
      other => panic!("expected an unknown register error, got {:?}", other),
    }
  }

  #[test]
  fn the_shift_register_image_is_stable() {
    let mut matrix = ApixMatrix::new(MatrixFlavor::M1);
    let image      = matrix.encode_shift_register();
    assert_eq!(image, matrix.encode_shift_register());
    assert!(matrix.shift_limit() < 32);
    // touching the configuration changes the image
    matrix.set_trim(0, 0, 7);
    assert_ne!(image, matrix.encode_shift_register());
  }

  #[test]
  fn run_token_walks_through_its_states() {
    let token = RunToken::new();
    assert_eq!(token.state(), RunState::Running);
    assert!(!token.stop_requested());
    let observer = token.clone();
    token.request_stop();
    assert!(observer.stop_requested());
    assert_eq!(observer.state(), RunState::StopRequested);
    observer.mark_stopped();
    assert!(token.is_stopped());
    // a stopped token never goes back to running
    token.request_stop();
    assert_eq!(token.state(), RunState::Stopped);
  }
}
